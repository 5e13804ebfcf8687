//! Mapping from store errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::store::{ChatError, ErrorKind};

/// Error returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Failure reported by the store or a guarded action.
    #[error(transparent)]
    Chat(#[from] ChatError),
    /// Malformed path or body that never reached the store.
    #[error("invalid request: {0}")]
    BadRequest(String),
}

/// Result alias for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    const fn kind(&self) -> ErrorKind {
        match self {
            Self::Chat(err) => err.kind(),
            Self::BadRequest(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, message) = match kind {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ErrorKind::InvalidArgument => (StatusCode::BAD_REQUEST, self.to_string()),
            ErrorKind::InvalidFormat => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ErrorKind::GenerationInProgress => (StatusCode::CONFLICT, self.to_string()),
            ErrorKind::StorageUnavailable => {
                tracing::error!("Storage error: {}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage unavailable".to_string(),
                )
            }
            ErrorKind::Configuration => {
                tracing::error!("Configuration error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": kind.as_str(),
        }));

        (status, body).into_response()
    }
}
