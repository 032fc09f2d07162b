//! The executor seam between the interlock and concrete tools.

use async_trait::async_trait;
use serde_json::Value;

use crate::action::Action;

/// Errors reported by an [`ActionExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// A collaborator could not be reached.
    #[error("{component} unavailable: {message}")]
    Unavailable {
        /// Failing collaborator (e.g. `llm`, `blocklist`).
        component: String,
        /// What went wrong.
        message: String,
    },

    /// A collaborator did not answer in time.
    #[error("{component} timed out after {after_ms}ms")]
    Timeout {
        /// Failing collaborator.
        component: String,
        /// Elapsed budget in milliseconds.
        after_ms: u64,
    },

    /// A collaborator answered with a failure.
    #[error("{component} failed: {message}")]
    Failed {
        /// Failing collaborator.
        component: String,
        /// What went wrong.
        message: String,
    },
}

impl ExecutorError {
    /// The collaborator that failed.
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::Unavailable { component, .. }
            | Self::Timeout { component, .. }
            | Self::Failed { component, .. } => component,
        }
    }
}

/// Output of an executed action.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Structured data, rendered as pretty JSON.
    Json(Value),
    /// Prose or a status line.
    Text(String),
}

impl ToolOutput {
    /// Render as text for a tool-calling client.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Json(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            },
            Self::Text(text) => text.clone(),
        }
    }
}

/// Runs validated actions against the real world.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute `action`.
    async fn execute(&self, action: &Action) -> Result<ToolOutput, ExecutorError>;
}
