//! Request dispatch: official passthrough or provider translation.
//!
//! The router reads the selected target fresh per invocation, wires the
//! provider's named transformer to its endpoint, and hands streaming replies
//! to the SSE transducer.

use crate::core::config::AnthropicConfig;
use crate::core::error::{AppError, Result};
use crate::services::account::AccountService;
use crate::services::provider::{ProviderRecord, ProviderService, RouteTarget};
use crate::transformer::{transform_sse_stream, ClaudeRequest, TransformerRegistry};
use anyhow::anyhow;
use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::sync::Arc;

const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Dispatches inbound Claude-shaped requests to the selected upstream.
pub struct ProxyService {
    providers: Arc<ProviderService>,
    accounts: Arc<AccountService>,
    transformers: Arc<TransformerRegistry>,
    http: reqwest::Client,
    anthropic: AnthropicConfig,
}

impl ProxyService {
    pub fn new(
        providers: Arc<ProviderService>,
        accounts: Arc<AccountService>,
        transformers: Arc<TransformerRegistry>,
        http: reqwest::Client,
        anthropic: AnthropicConfig,
    ) -> Self {
        ProxyService {
            providers,
            accounts,
            transformers,
            http,
            anthropic,
        }
    }

    /// Relay one messages request to the currently selected target.
    pub async fn relay(&self, payload: Value) -> Result<Response> {
        match self.providers.route_target().await? {
            RouteTarget::Official => self.forward_official(payload).await,
            RouteTarget::Provider { provider_id } => {
                let provider = self
                    .providers
                    .get_provider(&provider_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Config(anyhow!(
                            "selected provider '{}' no longer exists",
                            provider_id
                        ))
                    })?;
                let request: ClaudeRequest = serde_json::from_value(payload).map_err(|err| {
                    AppError::InvalidRequest(format!("malformed messages request: {}", err))
                })?;
                self.forward_provider(request, &provider).await
            }
        }
    }

    /// Official dispatch: bearer passthrough, body unchanged either way.
    async fn forward_official(&self, payload: Value) -> Result<Response> {
        let (account_id, token) = self.accounts.select_token().await?.ok_or_else(|| {
            AppError::Auth("no valid access token; connect an account first".to_string())
        })?;

        tracing::info!(account_id = %account_id, "forwarding to the official API");

        let upstream = self
            .http
            .post(&self.anthropic.api_url)
            .bearer_auth(&token.access_token)
            .header("anthropic-version", &self.anthropic.version)
            .header("anthropic-beta", &self.anthropic.beta)
            .json(&payload)
            .send()
            .await?;

        let status = upstream.status();
        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let streaming = content_type.contains(SSE_CONTENT_TYPE);

        tracing::debug!(status = %status, streaming, "official API replied");

        // Pass the upstream body through unchanged, success or error alike;
        // only headers are normalized.
        let mut builder = Response::builder()
            .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY))
            .header(header::CONTENT_TYPE, content_type);
        if streaming {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive");
        }
        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|err| AppError::Internal(format!("failed to build relay response: {}", err)))
    }

    /// Provider dispatch: translate, send, translate back.
    async fn forward_provider(
        &self,
        request: ClaudeRequest,
        provider: &ProviderRecord,
    ) -> Result<Response> {
        let transformer = self.transformers.get(&provider.transformer).ok_or_else(|| {
            AppError::Config(anyhow!(
                "unknown transformer '{}' for provider '{}'",
                provider.transformer,
                provider.name
            ))
        })?;

        let mut body = transformer.transform_request(&request)?;
        if let Some(object) = body.as_object_mut() {
            object.insert(
                "model".to_string(),
                Value::String(provider.model.clone()),
            );
        }

        tracing::info!(
            provider = %provider.name,
            model = %provider.model,
            stream = request.stream,
            "forwarding to provider"
        );

        let upstream = self
            .http
            .post(&provider.endpoint)
            .bearer_auth(&provider.api_key)
            .json(&body)
            .send()
            .await?;

        let status = upstream.status();
        if !status.is_success() {
            let body = upstream.text().await.unwrap_or_default();
            tracing::warn!(provider = %provider.name, status = %status, "provider call failed");
            return Err(AppError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let streaming = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.contains(SSE_CONTENT_TYPE))
            .unwrap_or(false);

        if streaming {
            let stream =
                transform_sse_stream(upstream.bytes_stream(), transformer.stream_transform());
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, SSE_CONTENT_TYPE)
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::CONNECTION, "keep-alive")
                .body(Body::from_stream(stream))
                .map_err(|err| {
                    AppError::Internal(format!("failed to build relay response: {}", err))
                })
        } else {
            let raw: Value = upstream.json().await?;
            let response = transformer.transform_response(raw)?;
            Ok(Json(response).into_response())
        }
    }
}
