//! Error types for the HTTP control API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use xrayctl_core::ManagementError;

/// Errors surfaced to API callers.
///
/// Every variant renders as `{"detail": "..."}`. Management failures never
/// leak their details to the caller.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or mismatched API key (403)
    #[error("Forbidden")]
    Forbidden,

    /// Caller exceeded the request rate limit (429)
    #[error("Too many requests")]
    RateLimited,

    /// Management channel failure (503)
    #[error("Xray unavailable")]
    Unavailable(#[from] ManagementError),

    /// Request body failed to parse or validate
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidBody { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Unavailable(cause) = &self {
            error!(error = %cause, retriable = cause.is_retriable(), "xray_error");
        }
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
