//! Error types for opine-qg

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
///
/// Trigger-surface contract: 200 on publish, 202 when generation was
/// triggered instead, 401 on bad credential, 502 on provider failure,
/// 500 on persistence failure.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or wrong trigger secret (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upstream AI provider failure (502)
    #[error("Provider error: {0}")]
    Provider(String),

    /// opine-common error (500, persistence and the like)
    #[error("Common error: {0}")]
    Common(#[from] opine_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Provider(msg) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
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

impl From<crate::pipeline::batch::BatchError> for ApiError {
    fn from(err: crate::pipeline::batch::BatchError) -> Self {
        use crate::pipeline::batch::BatchError;
        match err {
            BatchError::Provider(e) => ApiError::Provider(e.to_string()),
            BatchError::Storage(e) => ApiError::Common(e),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
