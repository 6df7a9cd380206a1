//! Error types and handling for the relay.
//!
//! This module provides a unified error type [`AppError`] that wraps various error sources
//! and implements proper HTTP response conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the application.
///
/// All errors in the application should be converted to this type for consistent handling.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration problems: unknown provider ids, unknown transformer names,
    /// malformed stored records. Reported, never retried.
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// HTTP request errors from the reqwest client
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller provided missing or malformed input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Token exchange/refresh failures and missing credentials.
    /// The message carries the upstream status and body where available.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Non-2xx reply from a forwarded provider call.
    /// Status and body are passed through to the caller.
    #[error("Provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    /// A single malformed SSE frame. Recovered where it occurs; the frame is
    /// skipped and the stream continues.
    #[error("Stream parse error: {0}")]
    StreamParse(String),

    /// Unexpected failure. The caller sees a generic message; detail goes to the logs.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::Config(err) => {
                tracing::error!("configuration error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "api_error",
                    err.to_string(),
                )
            }
            AppError::Request(err) => {
                if err.is_timeout() {
                    (
                        StatusCode::GATEWAY_TIMEOUT,
                        "api_error",
                        "Gateway timeout".to_string(),
                    )
                } else {
                    (StatusCode::BAD_GATEWAY, "api_error", err.to_string())
                }
            }
            AppError::Serialization(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                err.to_string(),
            ),
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error", msg)
            }
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, "authentication_error", msg),
            AppError::Provider { status, body } => {
                // Pass the upstream reply through unchanged where it is valid JSON.
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
                    return (status, Json(value)).into_response();
                }
                (status, "api_error", body)
            }
            AppError::StreamParse(msg) => {
                // Recovered at the stream layer; reaching here is unexpected.
                tracing::error!("stream parse error escaped recovery: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "api_error", msg)
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "api_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
