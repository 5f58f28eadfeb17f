//! Error types for the worker client

use thiserror::Error;

use crate::DeleteOutcome;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when calling a worker's resource API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Worker returned an unexpected status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the worker
        message: String,
    },

    /// Worker does not know the handle
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Worker refused because the resource is still referenced
    #[error("Resource conflict: {0}")]
    Conflict(String),

    /// Worker address cannot carry a resource path
    #[error("Invalid worker address: {0}")]
    InvalidAddress(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }
}

impl From<ClientError> for DeleteOutcome {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RequestFailed(e) if e.is_timeout() => DeleteOutcome::TimedOut,
            ClientError::RequestFailed(e) => DeleteOutcome::Unreachable(e.to_string()),
            ClientError::InvalidAddress(message) => DeleteOutcome::Unreachable(message),
            ClientError::NotFound(_) => DeleteOutcome::NotFound,
            ClientError::Conflict(message) => DeleteOutcome::Rejected {
                status: 409,
                message,
            },
            ClientError::ApiError { status: 404, .. } => DeleteOutcome::NotFound,
            ClientError::ApiError { status, message } => {
                DeleteOutcome::Rejected { status, message }
            }
        }
    }
}
