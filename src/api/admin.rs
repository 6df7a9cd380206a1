//! Admin surface: provider and account management, route selection, OAuth.
//!
//! Handlers are thin wrappers over the services; all state lives in the
//! key-value store behind them.

use crate::api::AppState;
use crate::core::error::Result;
use crate::services::account::AccountView;
use crate::services::oauth::LoginStart;
use crate::services::provider::{NewProvider, ProviderRecord, ProviderUpdate, RouteTarget};
use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

/// Build the admin router, nested under `/admin/v1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/providers", get(list_providers).post(add_provider))
        .route("/providers/:id", put(update_provider).delete(delete_provider))
        .route("/route", get(get_route).put(select_route))
        .route("/accounts", get(list_accounts).post(add_account))
        .route("/accounts/:id", delete(delete_account))
        .route("/accounts/:id/oauth", post(begin_login))
        .route("/accounts/:id/oauth/exchange", post(exchange_code))
        .route("/accounts/:id/oauth/refresh", post(refresh_token))
}

// ============================================================================
// Providers
// ============================================================================

async fn list_providers(State(state): State<AppState>) -> Result<Json<Vec<ProviderRecord>>> {
    Ok(Json(state.providers.list_providers().await?))
}

async fn add_provider(
    State(state): State<AppState>,
    Json(request): Json<NewProvider>,
) -> Result<Json<ProviderRecord>> {
    Ok(Json(state.providers.add_provider(request).await?))
}

async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProviderUpdate>,
) -> Result<Json<ProviderRecord>> {
    Ok(Json(state.providers.update_provider(&id, request).await?))
}

async fn delete_provider(State(state): State<AppState>, Path(id): Path<String>) -> Result<()> {
    state.providers.delete_provider(&id).await
}

// ============================================================================
// Route target
// ============================================================================

async fn get_route(State(state): State<AppState>) -> Result<Json<RouteTarget>> {
    Ok(Json(state.providers.route_target().await?))
}

async fn select_route(
    State(state): State<AppState>,
    Json(target): Json<RouteTarget>,
) -> Result<Json<RouteTarget>> {
    Ok(Json(state.providers.select_route(target).await?))
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Deserialize)]
struct NewAccount {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<AccountView>>> {
    Ok(Json(state.accounts.list_accounts().await?))
}

async fn add_account(
    State(state): State<AppState>,
    Json(request): Json<NewAccount>,
) -> Result<Json<crate::services::account::Account>> {
    Ok(Json(
        state
            .accounts
            .add_account(&request.name, request.description)
            .await?,
    ))
}

async fn delete_account(State(state): State<AppState>, Path(id): Path<String>) -> Result<()> {
    state.accounts.delete_account(&id).await
}

// ============================================================================
// OAuth
// ============================================================================

#[derive(Debug, Deserialize)]
struct ExchangeRequest {
    state: String,
    code: String,
}

async fn begin_login(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LoginStart>> {
    Ok(Json(state.oauth.begin_login(&id).await?))
}

async fn exchange_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExchangeRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .oauth
        .exchange_code(&id, &request.state, &request.code)
        .await?;
    Ok(Json(serde_json::json!({"status": "connected"})))
}

async fn refresh_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.oauth.refresh(&id).await?;
    Ok(Json(serde_json::json!({"status": "refreshed"})))
}
