// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::store::StoreError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request (validation, rejected before any store call)
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (authenticated but not staff/member of the class)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (illegal state transition, e.g. submitting twice)
    Conflict(String),

    // 503 Service Unavailable: optimistic retries exhausted
    RetryExhausted(String),

    // 500: a chunked cascade stopped part-way, leaving orphaned rows
    PartialCascade {
        parent: String,
        deleted: usize,
        reason: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::RetryExhausted(msg) => {
                tracing::warn!("Retry exhausted: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The resource is busy, please retry".to_string(),
                )
            }
            AppError::PartialCascade {
                parent,
                deleted,
                reason,
            } => {
                tracing::warn!(%parent, deleted, "Cascade delete incomplete: {}", reason);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Delete of {parent} did not complete, please retry"),
                )
            }
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Maps the store taxonomy onto application errors.
/// Allows using `?` operator on store calls.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => AppError::NotFound(format!("Document not found: {path}")),
            StoreError::RetryExhausted { .. } => AppError::RetryExhausted(err.to_string()),
            StoreError::Conflict(path) => {
                AppError::RetryExhausted(format!("Concurrent modification of {path}"))
            }
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}
