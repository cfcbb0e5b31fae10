//! Error types for libris-catalog
//!
//! Every handler error renders as `{"error": {"code", "message"}}`.

use crate::import::ImportError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Payload unreadable as a whole (400)
    #[error("{0}")]
    Structural(String),

    /// No caller identity (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Run id already in use (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Body above the configured ceiling (413)
    #[error("Payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// libris-common error
    #[error("Common error: {0}")]
    Common(#[from] libris_common::Error),
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Structural(structural) => ApiError::Structural(structural.to_string()),
            ImportError::PayloadTooLarge { limit, .. } => ApiError::PayloadTooLarge { limit },
            ImportError::Internal(msg) => ApiError::Internal(msg),
            ImportError::Common(err) => ApiError::Common(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Structural(_) => (StatusCode::BAD_REQUEST, "STRUCTURAL_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        };

        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Structural(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg,
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
