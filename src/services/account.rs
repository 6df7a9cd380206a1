//! Account registry and credential selection.
//!
//! Accounts are stored per-entity (`account:{id}`, `account_token:{id}`)
//! with an id index maintained under compare-and-swap. Account status is
//! derived from the token record at read time, never stored.

use crate::core::error::{AppError, Result};
use crate::core::store::{self, keys, KvStore};
use crate::core::now_ms;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored account record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<i64>,
}

/// Derived account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Expired,
}

/// Stored OAuth token record. Overwritten wholesale on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    pub expires_in: i64,
    /// Absolute expiry, milliseconds since epoch; always derived at persist
    /// time as `now + expires_in * 1000`.
    pub expires_at: i64,
    pub obtained_at: i64,
}

impl StoredToken {
    /// A token is valid while its expiry is strictly in the future.
    pub fn is_valid(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

/// Account as presented on the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenSummary>,
}

/// Token metadata exposed to the operator (never the token itself).
#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    pub expires_at: i64,
    pub obtained_at: i64,
    pub scope: String,
    pub is_expired: bool,
}

/// Derive an account's status from its token record.
///
/// `inactive` iff no token exists; `expired` iff a token exists and is past
/// its expiry; `active` otherwise.
pub fn derive_status(token: Option<&StoredToken>, now_ms: i64) -> AccountStatus {
    match token {
        None => AccountStatus::Inactive,
        Some(token) if !token.is_valid(now_ms) => AccountStatus::Expired,
        Some(_) => AccountStatus::Active,
    }
}

/// Account registry and token selector.
pub struct AccountService {
    store: Arc<dyn KvStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        AccountService { store }
    }

    /// Register a new account. Names must be unique.
    pub async fn add_account(&self, name: &str, description: Option<String>) -> Result<Account> {
        if name.is_empty() {
            return Err(AppError::InvalidRequest(
                "account name must not be empty".to_string(),
            ));
        }

        let existing = self.list_accounts().await?;
        if existing.iter().any(|view| view.account.name == name) {
            return Err(AppError::InvalidRequest(format!(
                "account name '{}' already exists",
                name
            )));
        }

        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description,
            created_at: now_ms(),
            last_active_at: None,
        };

        store::put_json(self.store.as_ref(), &keys::account(&account.id), &account).await?;
        store::update_id_index(self.store.as_ref(), keys::ACCOUNT_IDS, |mut ids| {
            if !ids.contains(&account.id) {
                ids.push(account.id.clone());
            }
            ids
        })
        .await?;

        tracing::info!(account_id = %account.id, name = %account.name, "account registered");
        Ok(account)
    }

    /// Remove an account along with its token and any pending login sessions.
    pub async fn delete_account(&self, id: &str) -> Result<()> {
        if self.get_account(id).await?.is_none() {
            return Err(AppError::InvalidRequest(format!(
                "account '{}' not found",
                id
            )));
        }

        self.store.delete(&keys::account(id)).await?;
        self.store.delete(&keys::account_token(id)).await?;
        store::update_id_index(self.store.as_ref(), keys::ACCOUNT_IDS, |ids| {
            ids.into_iter().filter(|known| known != id).collect()
        })
        .await?;

        // Sessions expire on their own, but dangling ones for a deleted
        // account are useless; sweep them now.
        for key in self.store.list(keys::PKCE_PREFIX).await? {
            if let Some(session) =
                store::get_json::<crate::services::oauth::PkceSession>(self.store.as_ref(), &key)
                    .await?
            {
                if session.account_id == id {
                    self.store.delete(&key).await?;
                }
            }
        }

        tracing::info!(account_id = %id, "account removed");
        Ok(())
    }

    pub async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        store::get_json(self.store.as_ref(), &keys::account(id)).await
    }

    /// Known account ids, in registration order.
    pub async fn account_ids(&self) -> Result<Vec<String>> {
        Ok(
            store::get_json(self.store.as_ref(), keys::ACCOUNT_IDS)
                .await?
                .unwrap_or_default(),
        )
    }

    pub async fn token(&self, id: &str) -> Result<Option<StoredToken>> {
        store::get_json(self.store.as_ref(), &keys::account_token(id)).await
    }

    /// Persist a token for an account and stamp it active.
    pub async fn store_token(&self, id: &str, token: &StoredToken) -> Result<()> {
        store::put_json(self.store.as_ref(), &keys::account_token(id), token).await?;
        self.mark_active(id).await
    }

    /// Update the account's last-active timestamp.
    pub async fn mark_active(&self, id: &str) -> Result<()> {
        if let Some(mut account) = self.get_account(id).await? {
            account.last_active_at = Some(now_ms());
            store::put_json(self.store.as_ref(), &keys::account(id), &account).await?;
        }
        Ok(())
    }

    /// All accounts with derived status, newest first.
    pub async fn list_accounts(&self) -> Result<Vec<AccountView>> {
        let now = now_ms();
        let mut views = Vec::new();

        for id in self.account_ids().await? {
            let Some(account) = self.get_account(&id).await? else {
                tracing::warn!(account_id = %id, "indexed account record is missing");
                continue;
            };
            let token = self.token(&id).await?;
            let status = derive_status(token.as_ref(), now);
            let token = token.map(|token| TokenSummary {
                expires_at: token.expires_at,
                obtained_at: token.obtained_at,
                scope: token.scope,
                is_expired: status == AccountStatus::Expired,
            });
            views.push(AccountView {
                account,
                status,
                token,
            });
        }

        views.sort_by(|a, b| b.account.created_at.cmp(&a.account.created_at));
        Ok(views)
    }

    /// Select the first currently-valid stored token, in account-id order.
    ///
    /// Read-only: never triggers a refresh inline. Staleness is corrected by
    /// the background refresh pass, keeping the request path free of refresh
    /// latency.
    pub async fn select_token(&self) -> Result<Option<(String, StoredToken)>> {
        let now = now_ms();
        for id in self.account_ids().await? {
            let Some(token) = self.token(&id).await? else {
                continue;
            };
            if !token.is_valid(now) {
                tracing::debug!(account_id = %id, "skipping expired token");
                continue;
            }
            return Ok(Some((id, token)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    fn token_with_expiry(expires_at: i64) -> StoredToken {
        StoredToken {
            access_token: format!("tok-{}", expires_at),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            scope: "user:inference".to_string(),
            expires_in: 3600,
            expires_at,
            obtained_at: now_ms(),
        }
    }

    fn service() -> AccountService {
        AccountService::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_derive_status() {
        let now = now_ms();
        assert_eq!(derive_status(None, now), AccountStatus::Inactive);
        assert_eq!(
            derive_status(Some(&token_with_expiry(now - 1)), now),
            AccountStatus::Expired
        );
        assert_eq!(
            derive_status(Some(&token_with_expiry(now + 60_000)), now),
            AccountStatus::Active
        );
        // Expiry exactly at now is not valid: strictly-greater wins.
        assert_eq!(
            derive_status(Some(&token_with_expiry(now)), now),
            AccountStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_add_and_list_accounts() {
        let service = service();
        service.add_account("work", None).await.unwrap();
        service
            .add_account("personal", Some("home".to_string()))
            .await
            .unwrap();

        let views = service.list_accounts().await.unwrap();
        assert_eq!(views.len(), 2);
        assert!(views
            .iter()
            .all(|view| view.status == AccountStatus::Inactive));
    }

    #[tokio::test]
    async fn test_duplicate_account_name_rejected() {
        let service = service();
        service.add_account("work", None).await.unwrap();
        let err = service.add_account("work", None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_delete_account_clears_token_and_index() {
        let service = service();
        let account = service.add_account("work", None).await.unwrap();
        service
            .store_token(&account.id, &token_with_expiry(now_ms() + 60_000))
            .await
            .unwrap();

        service.delete_account(&account.id).await.unwrap();

        assert!(service.get_account(&account.id).await.unwrap().is_none());
        assert!(service.token(&account.id).await.unwrap().is_none());
        assert!(service.account_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_account_fails() {
        let err = service().delete_account("nope").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_select_token_skips_expired() {
        let service = service();
        let first = service.add_account("first", None).await.unwrap();
        let second = service.add_account("second", None).await.unwrap();

        service
            .store_token(&first.id, &token_with_expiry(now_ms() - 1_000))
            .await
            .unwrap();
        let valid = token_with_expiry(now_ms() + 60_000);
        service.store_token(&second.id, &valid).await.unwrap();

        let (selected_id, selected) = service.select_token().await.unwrap().unwrap();
        assert_eq!(selected_id, second.id);
        assert_eq!(selected.access_token, valid.access_token);
    }

    #[tokio::test]
    async fn test_select_token_none_when_all_expired() {
        let service = service();
        let account = service.add_account("only", None).await.unwrap();
        service
            .store_token(&account.id, &token_with_expiry(now_ms() - 1))
            .await
            .unwrap();

        assert!(service.select_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_select_token_prefers_first_valid_in_order() {
        let service = service();
        let first = service.add_account("first", None).await.unwrap();
        let second = service.add_account("second", None).await.unwrap();

        service
            .store_token(&first.id, &token_with_expiry(now_ms() + 60_000))
            .await
            .unwrap();
        service
            .store_token(&second.id, &token_with_expiry(now_ms() + 120_000))
            .await
            .unwrap();

        let (selected_id, _) = service.select_token().await.unwrap().unwrap();
        assert_eq!(selected_id, first.id);
    }

    #[tokio::test]
    async fn test_store_token_marks_account_active() {
        let service = service();
        let account = service.add_account("work", None).await.unwrap();
        assert!(account.last_active_at.is_none());

        service
            .store_token(&account.id, &token_with_expiry(now_ms() + 60_000))
            .await
            .unwrap();

        let reloaded = service.get_account(&account.id).await.unwrap().unwrap();
        assert!(reloaded.last_active_at.is_some());

        let views = service.list_accounts().await.unwrap();
        assert_eq!(views[0].status, AccountStatus::Active);
        assert!(views[0].token.is_some());
    }
}
