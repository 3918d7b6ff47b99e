use thiserror::Error;

use crate::backend::common::BackendError;

/// Errors that can occur in the storage service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An error from the storage backend.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The backend did not complete the operation within the configured timeout.
    #[error("backend {operation} timed out")]
    Timeout {
        /// The operation that timed out, e.g. `"put"`.
        operation: &'static str,
    },

    /// All concurrency permits for backend operations are in use.
    #[error("too many concurrent backend operations")]
    AtCapacity,
}

/// Result type for service operations.
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
