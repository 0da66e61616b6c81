//! Error types for op-operations

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("Listener {listener} failed: {message}")]
    ListenerFailed { listener: String, message: String },

    #[error("Operation has no valid id: {0}")]
    MissingOperationId(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, OperationError>;

impl OperationError {
    /// Create a listener failure
    pub fn listener_failed(listener: impl Into<String>, message: impl Into<String>) -> Self {
        OperationError::ListenerFailed {
            listener: listener.into(),
            message: message.into(),
        }
    }

    /// Create a missing id error for the described operation
    pub fn missing_id(operation: impl Into<String>) -> Self {
        OperationError::MissingOperationId(operation.into())
    }
}
