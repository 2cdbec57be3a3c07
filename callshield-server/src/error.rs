//! Error types for the CallShield server
//!
//! Reuses the shared error enum and adds the HTTP response mapping.
//! Internal and database failures surface as a generic message; the
//! detail stays in the logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

pub use callshield_common::{Error, Result};

/// Wrapper turning [`Error`] into an HTTP response
pub struct ApiError(pub Error);

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Error::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Too many requests. Try again in {retry_after_secs}s."),
            ),
            Error::Database(e) => {
                error!("Database failure: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            other => {
                error!("Unhandled failure: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}
