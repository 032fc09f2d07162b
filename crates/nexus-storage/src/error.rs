//! Storage error types.

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A storage operation failed.
    #[error("storage error: {0}")]
    Internal(String),

    /// Connection to the storage backend failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The namespace or key is invalid.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A stored value is not in the expected on-disk layout.
    #[error("corrupt value for key {key}: {reason}")]
    Corrupt {
        /// Key whose value could not be decoded.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
