//! Outward error taxonomy.
//!
//! Collaborators signal typed failures; [`ServiceError`] is the one taxonomy
//! the transport layer sees. No operation retries — callers retry if they
//! care.

use crate::upload::UploadError;
use thiserror::Error;

/// Failure of one catalog operation, as reported to the transport layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code for error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::AlreadyExists(_) => "ALREADY_EXISTS",
            ServiceError::Cancelled => "CANCELLED",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<UploadError> for ServiceError {
    fn from(err: UploadError) -> Self {
        match &err {
            UploadError::RecordNotFound(_) => ServiceError::NotFound(err.to_string()),
            UploadError::MissingInfo
            | UploadError::DuplicateInfo
            | UploadError::TooLarge { .. }
            | UploadError::Closed => ServiceError::InvalidArgument(err.to_string()),
            UploadError::Storage(_) => ServiceError::Internal(err.to_string()),
        }
    }
}
