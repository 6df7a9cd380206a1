//! Provider registry and route-target selection.
//!
//! Providers are stored per-entity (`provider:{id}`) with an id index kept
//! under compare-and-swap; the currently selected dispatch target lives
//! under its own key and defaults to the official API.

use crate::core::error::{AppError, Result};
use crate::core::now_ms;
use crate::core::store::{self, keys, KvStore};
use crate::transformer::DEFAULT_TRANSFORMER;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configured third-party provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    pub name: String,
    /// Chat-completions endpoint URL
    pub endpoint: String,
    pub api_key: String,
    /// Model sent upstream, overriding whatever the caller asked for
    pub model: String,
    /// Name of the transformer to run requests and replies through
    pub transformer: String,
    pub created_at: i64,
}

/// Dispatch target for inbound requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteTarget {
    Official,
    Provider { provider_id: String },
}

impl Default for RouteTarget {
    fn default() -> Self {
        RouteTarget::Official
    }
}

/// New-provider parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProvider {
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub transformer: Option<String>,
}

/// Editable provider fields; id and creation time are preserved.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUpdate {
    pub name: String,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub transformer: Option<String>,
}

/// Provider registry backed by the key-value store.
pub struct ProviderService {
    store: Arc<dyn KvStore>,
}

impl ProviderService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        ProviderService { store }
    }

    /// Register a provider. Name and endpoint must be unique.
    pub async fn add_provider(&self, request: NewProvider) -> Result<ProviderRecord> {
        let existing = self.list_providers().await?;
        if existing
            .iter()
            .any(|p| p.name == request.name || p.endpoint == request.endpoint)
        {
            return Err(AppError::InvalidRequest(
                "provider name or endpoint already exists".to_string(),
            ));
        }

        let provider = ProviderRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            endpoint: request.endpoint,
            api_key: request.api_key,
            model: request.model,
            transformer: request
                .transformer
                .unwrap_or_else(|| DEFAULT_TRANSFORMER.to_string()),
            created_at: now_ms(),
        };

        store::put_json(self.store.as_ref(), &keys::provider(&provider.id), &provider).await?;
        store::update_id_index(self.store.as_ref(), keys::PROVIDER_IDS, |mut ids| {
            if !ids.contains(&provider.id) {
                ids.push(provider.id.clone());
            }
            ids
        })
        .await?;

        tracing::info!(provider_id = %provider.id, name = %provider.name, "provider registered");
        Ok(provider)
    }

    /// Update a provider in place.
    pub async fn update_provider(
        &self,
        id: &str,
        request: ProviderUpdate,
    ) -> Result<ProviderRecord> {
        let current = self.get_provider(id).await?.ok_or_else(|| {
            AppError::InvalidRequest(format!("provider '{}' not found", id))
        })?;

        let updated = ProviderRecord {
            id: current.id,
            name: request.name,
            endpoint: request.endpoint,
            api_key: request.api_key,
            model: request.model,
            transformer: request
                .transformer
                .unwrap_or_else(|| DEFAULT_TRANSFORMER.to_string()),
            created_at: current.created_at,
        };
        store::put_json(self.store.as_ref(), &keys::provider(id), &updated).await?;

        Ok(updated)
    }

    /// Remove a provider. Resets the route target when it pointed here.
    pub async fn delete_provider(&self, id: &str) -> Result<()> {
        if self.get_provider(id).await?.is_none() {
            return Err(AppError::InvalidRequest(format!(
                "provider '{}' not found",
                id
            )));
        }

        self.store.delete(&keys::provider(id)).await?;
        store::update_id_index(self.store.as_ref(), keys::PROVIDER_IDS, |ids| {
            ids.into_iter().filter(|known| known != id).collect()
        })
        .await?;

        if let RouteTarget::Provider { provider_id } = self.route_target().await? {
            if provider_id == id {
                self.set_route_target(RouteTarget::Official).await?;
                tracing::info!("route target reset to official after provider removal");
            }
        }

        tracing::info!(provider_id = %id, "provider removed");
        Ok(())
    }

    pub async fn get_provider(&self, id: &str) -> Result<Option<ProviderRecord>> {
        store::get_json(self.store.as_ref(), &keys::provider(id)).await
    }

    /// All providers, in registration order.
    pub async fn list_providers(&self) -> Result<Vec<ProviderRecord>> {
        let ids: Vec<String> = store::get_json(self.store.as_ref(), keys::PROVIDER_IDS)
            .await?
            .unwrap_or_default();

        let mut providers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(provider) = self.get_provider(&id).await? {
                providers.push(provider);
            } else {
                tracing::warn!(provider_id = %id, "indexed provider record is missing");
            }
        }
        Ok(providers)
    }

    /// Current dispatch target; defaults to the official API.
    pub async fn route_target(&self) -> Result<RouteTarget> {
        Ok(
            store::get_json(self.store.as_ref(), keys::ROUTE_TARGET)
                .await?
                .unwrap_or_default(),
        )
    }

    /// Select the dispatch target. Provider targets must exist.
    pub async fn select_route(&self, target: RouteTarget) -> Result<RouteTarget> {
        if let RouteTarget::Provider { provider_id } = &target {
            if self.get_provider(provider_id).await?.is_none() {
                return Err(AppError::InvalidRequest(format!(
                    "provider '{}' not found",
                    provider_id
                )));
            }
        }
        self.set_route_target(target.clone()).await?;
        Ok(target)
    }

    async fn set_route_target(&self, target: RouteTarget) -> Result<()> {
        store::put_json(self.store.as_ref(), keys::ROUTE_TARGET, &target).await
    }
}
