//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while installing the logging stack.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid level, directive or target.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A global subscriber is already installed, or installation failed.
    #[error("Initialization error: {0}")]
    InitError(String),

    /// The log directory could not be prepared.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
