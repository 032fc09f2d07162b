//! Error types for the gateway.

use thiserror::Error;

/// Gateway error type.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration could not be turned into a running gateway.
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration failed to load or validate.
    #[error(transparent)]
    ConfigLoad(#[from] nexus_config::ConfigError),

    /// Store error.
    #[error("storage error: {0}")]
    Storage(#[from] nexus_storage::StorageError),

    /// Model provider error.
    #[error("model error: {0}")]
    Llm(#[from] nexus_llm::LlmError),

    /// Tool construction or event-log error.
    #[error("tool error: {0}")]
    Tool(#[from] nexus_tools::ToolError),

    /// Approval interlock error.
    #[error("approval error: {0}")]
    Approval(#[from] nexus_approval::ApprovalError),

    /// RPC transport or remote call error.
    #[error("rpc error: {0}")]
    Rpc(#[from] jsonrpsee::core::ClientError),

    /// Server runtime error.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
