//! Per-call context for correlating log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context carried through a single tool call.
///
/// Every gateway call gets one; its [`span`](Self::span) wraps the work so
/// that interlock, store and executor logs share a `request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Correlation ID shared by related requests (defaults to `request_id`).
    pub correlation_id: Uuid,
    /// When the request started.
    pub started_at: DateTime<Utc>,
    /// Component that created this context (e.g. `rpc`, `cli`).
    pub source: String,
    /// Operation being performed, usually the tool name.
    pub operation: Option<String>,
}

impl RequestContext {
    /// Create a new request context.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            request_id: id,
            correlation_id: id,
            started_at: Utc::now(),
            source: source.into(),
            operation: None,
        }
    }

    /// Set the correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Milliseconds since the request started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// Create a tracing span with this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            correlation_id = %self.correlation_id,
            source = %self.source,
            operation = self.operation.as_deref(),
        )
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new("unknown")
    }
}
