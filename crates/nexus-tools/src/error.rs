//! Error types for the tool collaborators.

use nexus_approval::ExecutorError;
use nexus_llm::LlmError;
use nexus_storage::StorageError;
use thiserror::Error;

/// Errors raised by health probes, the event log, the blocklist and the
/// analyzer.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The key-value store failed.
    #[error("{component} storage error: {source}")]
    Storage {
        /// Which tool was using the store (`events`, `blocklist`).
        component: &'static str,
        /// Underlying storage error.
        #[source]
        source: StorageError,
    },

    /// The language model failed.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// A collaborator did not answer in time.
    #[error("{component} timed out after {after_ms}ms")]
    Timeout {
        /// Which collaborator timed out.
        component: &'static str,
        /// Elapsed budget in milliseconds.
        after_ms: u64,
    },

    /// A recorded event was rejected.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl ToolError {
    pub(crate) fn storage(component: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::Storage { component, source }
    }

    pub(crate) fn timeout(component: &'static str, after: std::time::Duration) -> Self {
        Self::Timeout {
            component,
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<ToolError> for ExecutorError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Storage { component, source } => Self::Unavailable {
                component: component.to_string(),
                message: source.to_string(),
            },
            ToolError::Timeout {
                component,
                after_ms,
            } => Self::Timeout {
                component: component.to_string(),
                after_ms,
            },
            ToolError::Llm(LlmError::Timeout { after_ms }) => Self::Timeout {
                component: "llm".to_string(),
                after_ms,
            },
            ToolError::Llm(
                e @ (LlmError::ApiRequestFailed(_)
                | LlmError::HttpError(_)
                | LlmError::RateLimitExceeded { .. }),
            ) => Self::Unavailable {
                component: "llm".to_string(),
                message: e.to_string(),
            },
            ToolError::Llm(e) => Self::Failed {
                component: "llm".to_string(),
                message: e.to_string(),
            },
            ToolError::InvalidEvent(message) => Self::Failed {
                component: "events".to_string(),
                message,
            },
            ToolError::Client(e) => Self::Failed {
                component: "http".to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
