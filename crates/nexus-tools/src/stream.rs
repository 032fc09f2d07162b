//! Security events read straight from the rate limiter's Redis stream.
//!
//! Aegis appends every blocked request to the `suspicious_traffic` stream.
//! With the `redis` backend the gateway reads that stream with `XREVRANGE`
//! instead of keeping its own copy, and events reported over RPC are
//! appended to the same stream.
//!
//! Aegis and older reporters disagree on field names, so both spellings are
//! accepted when reading:
//!
//! | Event field | Stream fields, in order of preference |
//! |-------------|---------------------------------------|
//! | `client_id` | `client_id`, `clientId` |
//! | `ip` | `ip_address`, `ip` |
//! | `reason` | `reason`, then `severity` and `endpoint` |
//! | `timestamp` | `timestamp` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use nexus_storage::{RedisKvStore, StreamEntry};
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::events::{
    DEFAULT_MAX_EVENTS, EventSource, NewSecurityEvent, SecurityEvent, now_rfc3339,
};

/// Stream Aegis publishes blocked requests to.
pub const DEFAULT_TRAFFIC_STREAM: &str = "suspicious_traffic";

const COMPONENT: &str = "events";

/// [`EventSource`] over a Redis stream.
#[derive(Debug, Clone)]
pub struct RedisEventStream {
    store: Arc<RedisKvStore>,
    stream: String,
    max_len: usize,
}

impl RedisEventStream {
    /// Read and append `stream`.
    #[must_use]
    pub fn new(store: Arc<RedisKvStore>, stream: impl Into<String>) -> Self {
        Self {
            store,
            stream: stream.into(),
            max_len: DEFAULT_MAX_EVENTS,
        }
    }

    /// Approximate length the stream is trimmed to on append.
    #[must_use]
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(1);
        self
    }

    /// Stream key.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }
}

#[async_trait]
impl EventSource for RedisEventStream {
    async fn recent(&self, limit: usize) -> ToolResult<Vec<SecurityEvent>> {
        let entries = self
            .store
            .stream_rev_range(&self.stream, limit)
            .await
            .map_err(ToolError::storage(COMPONENT))?;
        Ok(entries.into_iter().map(from_stream_entry).collect())
    }

    async fn record(&self, event: NewSecurityEvent) -> ToolResult<SecurityEvent> {
        event.validate()?;
        let timestamp = event.timestamp.unwrap_or_else(now_rfc3339);

        let mut fields = vec![("timestamp", timestamp.clone())];
        if let Some(client_id) = &event.client_id {
            fields.push(("client_id", client_id.clone()));
        }
        if let Some(ip) = &event.ip {
            fields.push(("ip_address", ip.clone()));
        }
        if let Some(reason) = &event.reason {
            fields.push(("reason", reason.clone()));
        }

        let id = self
            .store
            .stream_append(&self.stream, &fields, self.max_len)
            .await
            .map_err(ToolError::storage(COMPONENT))?;
        debug!(id = %id, stream = %self.stream, ip = ?event.ip, "appended security event");

        Ok(SecurityEvent {
            id,
            client_id: event.client_id,
            ip: event.ip,
            reason: event.reason,
            timestamp: Some(timestamp),
        })
    }
}

fn from_stream_entry(entry: StreamEntry) -> SecurityEvent {
    let StreamEntry { id, mut fields } = entry;
    let client_id = take_first(&mut fields, &["client_id", "clientId"]);
    let ip = take_first(&mut fields, &["ip_address", "ip"]);
    let reason = take_first(&mut fields, &["reason"]).or_else(|| {
        let severity = fields.remove("severity");
        let endpoint = fields.remove("endpoint");
        match (severity, endpoint) {
            (Some(severity), Some(endpoint)) => Some(format!("{severity} on {endpoint}")),
            (severity, endpoint) => severity.or(endpoint),
        }
    });
    let timestamp = fields.remove("timestamp");

    SecurityEvent {
        id,
        client_id,
        ip,
        reason,
        timestamp,
    }
}

fn take_first(fields: &mut HashMap<String, String>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| fields.remove(*name))
}
