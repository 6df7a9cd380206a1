//! OAuth token lifecycle: PKCE login, code exchange, refresh.
//!
//! The token endpoint is treated as a black box behind one request shape;
//! everything else here is PKCE material generation, session bookkeeping in
//! the key-value store, and token normalization.

use crate::core::config::OAuthConfig;
use crate::core::error::{AppError, Result};
use crate::core::now_ms;
use crate::core::store::{self, keys, KvStore};
use crate::services::account::{AccountService, StoredToken};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Pending login sessions are valid for ten minutes.
const PKCE_SESSION_TTL: Duration = Duration::from_secs(600);

/// Pending PKCE login session, keyed by `state`. Single-use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkceSession {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub account_id: String,
    pub created_at: i64,
}

/// What the operator needs to complete the browser leg of a login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginStart {
    pub auth_url: String,
    pub state: String,
}

/// Token endpoint reply shape.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEndpointReply {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// OAuth login and refresh flows for stored accounts.
pub struct OAuthService {
    store: Arc<dyn KvStore>,
    accounts: Arc<AccountService>,
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthService {
    pub fn new(
        store: Arc<dyn KvStore>,
        accounts: Arc<AccountService>,
        http: reqwest::Client,
        config: OAuthConfig,
    ) -> Self {
        OAuthService {
            store,
            accounts,
            http,
            config,
        }
    }

    /// Start a PKCE login for an account.
    ///
    /// Generates verifier/state material, persists the session with a
    /// ten-minute validity, and returns the authorize URL to open.
    pub async fn begin_login(&self, account_id: &str) -> Result<LoginStart> {
        if self.accounts.get_account(account_id).await?.is_none() {
            return Err(AppError::InvalidRequest(format!(
                "account '{}' not found",
                account_id
            )));
        }

        let code_verifier = random_urlsafe(32);
        let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
        let state = random_urlsafe(32);

        let session = PkceSession {
            state: state.clone(),
            code_verifier,
            code_challenge: code_challenge.clone(),
            account_id: account_id.to_string(),
            created_at: now_ms(),
        };
        self.store
            .put_with_ttl(
                &keys::pkce(&state),
                serde_json::to_string(&session)?,
                PKCE_SESSION_TTL,
            )
            .await?;

        let auth_url = reqwest::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("code", "true"),
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", self.config.scopes.as_str()),
                ("code_challenge", code_challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|err| AppError::Internal(format!("invalid authorize url: {}", err)))?;

        tracing::info!(account_id = %account_id, "login session created");
        Ok(LoginStart {
            auth_url: auth_url.to_string(),
            state,
        })
    }

    /// Exchange a pasted authorization code for a token.
    ///
    /// The session is looked up by `state` and consumed on success; a second
    /// exchange with the same state fails.
    pub async fn exchange_code(&self, account_id: &str, state: &str, code: &str) -> Result<()> {
        let session_key = keys::pkce(state);
        let session: PkceSession = store::get_json(self.store.as_ref(), &session_key)
            .await?
            .ok_or_else(|| {
                AppError::Auth("login session expired or unknown".to_string())
            })?;

        if session.account_id != account_id {
            return Err(AppError::Auth(
                "account does not match login session".to_string(),
            ));
        }

        let code = sanitize_auth_code(code);
        let reply = self
            .request_token(&json!({
                "grant_type": "authorization_code",
                "client_id": self.config.client_id,
                "code": code,
                "redirect_uri": self.config.redirect_uri,
                "code_verifier": session.code_verifier,
                "state": session.state,
            }))
            .await?;

        let token = normalize_token(reply);
        self.accounts.store_token(account_id, &token).await?;
        self.store.delete(&session_key).await?;

        tracing::info!(account_id = %account_id, "authorization code exchanged");
        Ok(())
    }

    /// Refresh an account's token in place.
    pub async fn refresh(&self, account_id: &str) -> Result<()> {
        let current = self
            .accounts
            .token(account_id)
            .await?
            .ok_or_else(|| AppError::Auth("no stored token for account".to_string()))?;

        if current.refresh_token.is_empty() {
            return Err(AppError::Auth("no refresh token for account".to_string()));
        }

        let reply = self
            .request_token(&json!({
                "grant_type": "refresh_token",
                "refresh_token": current.refresh_token,
                "client_id": self.config.client_id,
            }))
            .await?;

        let token = normalize_token(reply);
        self.accounts.store_token(account_id, &token).await?;

        tracing::info!(account_id = %account_id, "token refreshed");
        Ok(())
    }

    /// Black-box call to the token endpoint.
    async fn request_token(&self, body: &Value) -> Result<TokenEndpointReply> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(response.json().await?)
    }
}

/// Normalize a token endpoint reply into the stored record.
///
/// `expires_at` is always derived here, never taken from the caller.
fn normalize_token(reply: TokenEndpointReply) -> StoredToken {
    let now = now_ms();
    StoredToken {
        access_token: reply.access_token,
        refresh_token: reply.refresh_token,
        token_type: reply.token_type.unwrap_or_else(|| "Bearer".to_string()),
        scope: reply.scope.unwrap_or_default(),
        expires_in: reply.expires_in,
        expires_at: now + reply.expires_in * 1000,
        obtained_at: now,
    }
}

/// Authorization codes are frequently pasted with trailing URL fragments;
/// truncate at the first `#`, `&`, or `?` and trim whitespace.
fn sanitize_auth_code(code: &str) -> String {
    code.split(['#', '&', '?'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Cryptographically random bytes, URL-safe base64 without padding.
fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
