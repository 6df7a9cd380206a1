//! Relay endpoint handlers.

use crate::api::AppState;
use crate::core::error::Result;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

/// `POST /v1/messages`: relay a Claude-shaped request to the selected target.
///
/// The payload stays untyped here: official dispatch forwards it unchanged,
/// and the provider path deserializes it only when translation is required.
pub async fn relay_messages(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response> {
    state.proxy.relay(payload).await
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}
