//! Error types for moody-tunes HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Message shown when the provider misbehaves; raw provider bodies never reach callers
pub const PROVIDER_UNAVAILABLE_MESSAGE: &str =
    "Spotify is having trouble right now. Please try again in a few minutes.";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Uniqueness violation (400)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing identity or provider scope (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Local per-user limiter refused the request (429)
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// Provider or provider-client failure (502)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// moody-common error
    #[error("Common error: {0}")]
    Common(#[from] moody_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::BAD_REQUEST, "CONFLICT", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", msg),
            ApiError::ProviderUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Provider failure surfaced to caller");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_UNAVAILABLE",
                    PROVIDER_UNAVAILABLE_MESSAGE.to_string(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
            ApiError::Common(err) => return common_response(err),
        };

        error_body(status, error_code, message)
    }
}

fn common_response(err: moody_common::Error) -> Response {
    use moody_common::Error;

    let (status, error_code, message) = match err {
        Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        Error::Conflict(msg) => (StatusCode::BAD_REQUEST, "CONFLICT", msg),
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        Error::Permission(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        Error::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", msg),
        ref provider @ (Error::Provider { .. } | Error::Client(_)) => {
            tracing::warn!(error = %provider, "Provider failure surfaced to caller");
            (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_UNAVAILABLE",
                PROVIDER_UNAVAILABLE_MESSAGE.to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Unhandled error in request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            )
        }
    };

    error_body(status, error_code, message)
}

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message,
        }
    }));

    (status, body).into_response()
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
