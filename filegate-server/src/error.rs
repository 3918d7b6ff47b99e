//! Error types for the filegate API layer.

use std::error::Error;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use filegate_service::{InvalidNameError, ServiceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request is malformed, e.g. it lacks a file part.
    #[error("{0}")]
    BadRequest(String),

    /// The file name taken from the request is not acceptable.
    #[error("invalid file name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// The multipart request body could not be read.
    #[error("invalid multipart body: {}", .0.body_text())]
    Multipart(#[from] MultipartError),

    /// The requested file does not exist.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Reading a stored file failed after the backend started streaming it.
    #[error("error reading file: {0}")]
    Stream(#[source] std::io::Error),

    /// The storage backend failed to perform the operation.
    #[error("storage error: {0}")]
    Service(#[from] ServiceError),
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A JSON error response returned by the API.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    /// Always `"error"`.
    pub status: String,
    /// A human readable description of the error.
    pub message: String,
}

impl ApiErrorResponse {
    /// Creates an error response from an error.
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        Self {
            status: "error".to_owned(),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) | ApiError::InvalidName(_) => {
                tracing::debug!(error = &self as &dyn Error, "bad request");
                StatusCode::BAD_REQUEST
            }
            ApiError::Multipart(err) => {
                tracing::debug!(error = &self as &dyn Error, "bad multipart request");
                err.status()
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Stream(_) | ApiError::Service(_) => {
                tracing::error!(error = &self as &dyn Error, "error handling request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ApiErrorResponse::from_error(&self);
        (status, Json(body)).into_response()
    }
}
