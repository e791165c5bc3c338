//! Error types for surya-audit HTTP handlers

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

    /// Invalid request or transition (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Concurrent modification (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A site could not be audited (422), carrying the site error code
    #[error("Site audit failed: {1}")]
    SiteFailed(String, String),

    /// Feature not configured for this instance (503)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Stored record failed its integrity check (500)
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<surya_common::Error> for ApiError {
    fn from(err: surya_common::Error) -> Self {
        use surya_common::Error;
        match err {
            Error::NotFound(_) => ApiError::NotFound(err.to_string()),
            Error::InvalidInput(_) | Error::InvalidTransition(_) | Error::Invariant(_) => {
                ApiError::BadRequest(err.to_string())
            }
            Error::RevisionConflict { .. } => ApiError::Conflict(err.to_string()),
            Error::Integrity { .. } => ApiError::Integrity(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<crate::models::SiteError> for ApiError {
    fn from(err: crate::models::SiteError) -> Self {
        ApiError::SiteFailed(err.error_code, err.error_message)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::SiteFailed(code, msg) => {
                let body = Json(json!({
                    "error": {
                        "code": code,
                        "message": msg,
                    }
                }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            ApiError::Integrity(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTEGRITY_ERROR",
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
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
