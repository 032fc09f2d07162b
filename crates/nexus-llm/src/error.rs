//! LLM-related error types.

use thiserror::Error;

/// Errors that can occur with LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API key not configured.
    #[error("API key not configured for {provider}")]
    ApiKeyNotConfigured {
        /// Provider name.
        provider: String,
    },

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequestFailed(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded, retry after {retry_after_secs} seconds")]
    RateLimitExceeded {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Invalid response from API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// The provider did not answer within the configured timeout.
    #[error("LLM request timed out after {after_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        after_ms: u64,
    },

    /// HTTP error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;
