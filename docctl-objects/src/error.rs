//! Object store error types.

use thiserror::Error;

/// Object store errors.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout.
    #[error("Object store request timed out after {0} seconds")]
    Timeout(u64),

    /// The store answered with a non-success status.
    #[error("Object store error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error message from the store.
        message: String,
    },

    /// The bucket does not exist.
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// The store is unreachable or refused the operation.
    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    /// The client could not be configured.
    #[error("Invalid object store configuration: {0}")]
    InvalidConfig(String),
}

impl ObjectStoreError {
    /// Whether a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ObjectStoreError::RequestFailed(e) => e.is_connect() || e.is_timeout(),
            ObjectStoreError::Timeout(_) | ObjectStoreError::Unavailable(_) => true,
            ObjectStoreError::ApiError { status, .. } => *status >= 500 || *status == 429,
            ObjectStoreError::BucketNotFound(_) | ObjectStoreError::InvalidConfig(_) => false,
        }
    }
}

/// Result type for object store operations.
pub type ObjectResult<T> = Result<T, ObjectStoreError>;
