use std::io;

/// Errors surfaced by handle and tree operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("IO failure: {message}")]
    IoFailure {
        message: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

impl StorageError {
    /// Wrap a provider error with a description of what was being attempted
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        StorageError::IoFailure {
            message: message.into(),
            source,
        }
    }
}
