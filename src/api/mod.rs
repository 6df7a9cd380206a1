//! HTTP surface: the relay endpoint plus the admin API.
//!
//! This layer adds no semantics of its own; handlers parse and serialize,
//! then delegate to the services.

pub mod admin;
pub mod messages;

use crate::services::{AccountService, OAuthService, ProviderService, ProxyService};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub providers: Arc<ProviderService>,
    pub oauth: Arc<OAuthService>,
    pub proxy: Arc<ProxyService>,
}

/// Build the application router.
///
/// `request_timeout` bounds non-streaming admin work; the relay endpoint is
/// excluded so long-lived SSE responses are not cut off mid-stream.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let admin_routes = admin::router().layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/v1/messages", post(messages::relay_messages))
        .route("/health", get(messages::health))
        .nest("/admin/v1", admin_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
