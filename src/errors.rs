//! HTTP-facing error type.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors a request handler can surface to the client.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request was malformed or missing required content
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An upstream collaborator failed before any response was streamed
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Anything else; details are logged, not sent to the client
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Upstream(message) => {
                error!("Upstream failure: {message}");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream service unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                error!("Internal error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_maps_to_400() {
        let response = AppError::BadRequest("message is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let response =
            AppError::Internal(anyhow::anyhow!("secret database path")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
