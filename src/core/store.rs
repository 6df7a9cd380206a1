//! Key-value storage abstraction.
//!
//! All durable relay state (accounts, tokens, PKCE sessions, provider records,
//! the route target) lives behind the [`KvStore`] trait so the storage backend
//! stays swappable. The store offers no transactions; the only concurrency
//! primitive is [`KvStore::compare_and_swap`], which the id-index helpers use
//! to avoid lost updates on list-valued keys.

use crate::core::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::time::{Duration, Instant};

/// Well-known key layout for the relay's stored state.
pub mod keys {
    /// JSON string-list of known account ids, in registration order.
    pub const ACCOUNT_IDS: &str = "account_ids";
    /// JSON string-list of known provider ids, in registration order.
    pub const PROVIDER_IDS: &str = "provider_ids";
    /// Currently selected dispatch target.
    pub const ROUTE_TARGET: &str = "route_target";
    /// Prefix for pending OAuth login sessions, keyed by `state`.
    pub const PKCE_PREFIX: &str = "oauth_pkce:";

    pub fn account(id: &str) -> String {
        format!("account:{}", id)
    }

    pub fn account_token(id: &str) -> String {
        format!("account_token:{}", id)
    }

    pub fn provider(id: &str) -> String {
        format!("provider:{}", id)
    }

    pub fn pkce(state: &str) -> String {
        format!("{}{}", PKCE_PREFIX, state)
    }
}

/// Simple asynchronous key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String) -> Result<()>;

    /// Store a value that disappears after `ttl`.
    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// List all live keys beginning with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Write `value` only if the current value equals `expected`
    /// (`None` meaning the key is absent). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
    ) -> Result<bool>;
}

/// Read a key and deserialize its JSON value.
pub async fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize a value to JSON and store it.
pub async fn put_json<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    store.put(key, serde_json::to_string(value)?).await
}

/// Apply `mutate` to a JSON string-list key under a compare-and-swap loop.
///
/// Retries until the swap lands, so concurrent registrations cannot drop
/// each other's entries.
pub async fn update_id_index<F>(store: &dyn KvStore, key: &str, mutate: F) -> Result<()>
where
    F: Fn(Vec<String>) -> Vec<String> + Send + Sync,
{
    loop {
        let current = store.get(key).await?;
        let ids: Vec<String> = match current.as_deref() {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };
        let updated = serde_json::to_string(&mutate(ids))?;
        if store
            .compare_and_swap(key, current.as_deref(), updated)
            .await?
        {
            return Ok(());
        }
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// In-memory [`KvStore`] implementation.
///
/// TTL entries expire lazily: expired values are treated as absent and
/// removed when touched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }
        // Expired: drop it so list() stays clean.
        self.entries.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn put_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
    ) -> Result<bool> {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        let swapped = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let live = occupied.get().is_live(now);
                let matches = match (live, expected) {
                    (true, Some(expected)) => occupied.get().value == expected,
                    (true, None) => false,
                    // An expired entry counts as absent.
                    (false, expectation) => expectation.is_none(),
                };
                if matches {
                    occupied.insert(StoredEntry {
                        value,
                        expires_at: None,
                    });
                }
                matches
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(StoredEntry {
                        value,
                        expires_at: None,
                    });
                    true
                } else {
                    false
                }
            }
        };
        Ok(swapped)
    }
}
