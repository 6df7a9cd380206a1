//! Claude Relay - main entry point
//!
//! Builds the service graph (store, transformer registry, services), spawns
//! the background token-refresh task, and runs the HTTP server.

use anyhow::Result;
use claude_relay::core::{logging, AppConfig, MemoryStore};
use claude_relay::services::{
    spawn_refresh_task, AccountService, OAuthService, ProviderService, ProxyService,
};
use claude_relay::transformer::TransformerRegistry;
use claude_relay::{build_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    logging::init();

    let config = AppConfig::from_env()?;
    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    let http_client = create_http_client(request_timeout);
    let store = Arc::new(MemoryStore::new());

    let accounts = Arc::new(AccountService::new(store.clone()));
    let providers = Arc::new(ProviderService::new(store.clone()));
    let oauth = Arc::new(OAuthService::new(
        store.clone(),
        accounts.clone(),
        http_client.clone(),
        config.oauth.clone(),
    ));
    let transformers = Arc::new(TransformerRegistry::new());
    let proxy = Arc::new(ProxyService::new(
        providers.clone(),
        accounts.clone(),
        transformers,
        http_client,
        config.anthropic.clone(),
    ));

    let _refresh_task = spawn_refresh_task(
        accounts.clone(),
        oauth.clone(),
        Duration::from_secs(config.token_refresh_interval_secs),
    );

    let state = AppState {
        accounts,
        providers,
        oauth,
        proxy,
    };
    let app = build_router(state, request_timeout);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid bind address: {}", err))?;

    tracing::info!("Starting Claude Relay on {}", addr);
    tracing::info!("Relay endpoint: POST /v1/messages");
    tracing::info!("Admin API: /admin/v1/*");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the shared HTTP client with connection pooling.
fn create_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .expect("Failed to build HTTP client")
}
