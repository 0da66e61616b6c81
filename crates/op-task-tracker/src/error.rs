//! Error types for op-task-tracker

use op_operations::OperationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Task operation {operation} has no valid id")]
    MissingOperationId { operation: String },

    #[error("Task execution tracker has been closed")]
    Disposed,

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, TrackerError>;

impl TrackerError {
    /// Create a missing id error for the described operation
    pub fn missing_id(operation: impl ToString) -> Self {
        TrackerError::MissingOperationId {
            operation: operation.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        TrackerError::InvalidConfig(msg.into())
    }
}

impl From<TrackerError> for OperationError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::MissingOperationId { operation } => OperationError::MissingOperationId(operation),
            other => OperationError::listener_failed("task-execution-tracker", other.to_string()),
        }
    }
}
