use crate::executor::ExecutorError;

/// Errors that can occur while submitting or approving an action.
///
/// An invalid, expired or already used token is *not* an error; it is the
/// [`Outcome::InvalidToken`](crate::Outcome::InvalidToken) outcome.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// An argument failed validation. Nothing was stored or executed.
    #[error("invalid argument '{argument}': {message}")]
    Validation {
        /// The offending argument.
        argument: String,
        /// Human-readable reason, naming the offending value.
        message: String,
    },

    /// The operation name is not in the registry.
    #[error("unknown operation: {name}")]
    UnknownOperation {
        /// The name that was requested.
        name: String,
    },

    /// A dependency (the store) failed or timed out.
    #[error("{component} unavailable: {message}")]
    UpstreamUnavailable {
        /// The component that failed.
        component: String,
        /// What went wrong.
        message: String,
    },

    /// The executor failed while running an action.
    #[error("execution of {action} failed: {source}")]
    Execution {
        /// The action that was being executed.
        action: String,
        /// The underlying executor failure.
        #[source]
        source: ExecutorError,
    },

    /// Internal interlock error.
    #[error("internal approval error: {0}")]
    Internal(String),
}

impl ApprovalError {
    /// Shorthand for a validation failure.
    pub fn validation(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, used at the dispatch boundary.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Execution { .. } => "execution_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
