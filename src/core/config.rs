//! Configuration management for the relay.
//!
//! All settings come from the environment (optionally via a `.env` file),
//! using the `RELAY_` prefix with `__` as the section separator, e.g.
//! `RELAY_SERVER__PORT=9000` or `RELAY_OAUTH__CLIENT_ID=...`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Official API endpoint and protocol headers
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// OAuth endpoints and client parameters
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Request timeout in seconds for upstream calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Interval in seconds between background token refresh passes
    #[serde(default = "default_refresh_interval")]
    pub token_refresh_interval_secs: u64,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Official vendor endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    /// Messages endpoint for official dispatch
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// `anthropic-version` header value
    #[serde(default = "default_api_version")]
    pub version: String,

    /// `anthropic-beta` header value sent with OAuth bearer credentials
    #[serde(default = "default_beta_header")]
    pub beta: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            version: default_api_version(),
            beta: default_beta_header(),
        }
    }
}

/// OAuth client configuration for account logins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Must stay on the vendor's own callback; the code is pasted back manually.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Space-separated scope list
    #[serde(default = "default_scopes")]
    pub scopes: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            client_id: default_client_id(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            anthropic: AnthropicConfig::default(),
            oauth: OAuthConfig::default(),
            request_timeout_secs: default_request_timeout(),
            token_refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read environment configuration")?;

        settings
            .try_deserialize()
            .context("invalid relay configuration")
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout() -> u64 {
    300
}

fn default_refresh_interval() -> u64 {
    1800
}

fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_beta_header() -> String {
    "oauth-2025-04-20".to_string()
}

fn default_authorize_url() -> String {
    "https://claude.ai/oauth/authorize".to_string()
}

fn default_token_url() -> String {
    "https://console.anthropic.com/v1/oauth/token".to_string()
}

fn default_client_id() -> String {
    "9d1c250a-e61b-44d9-88ed-5944d1962f5e".to_string()
}

fn default_redirect_uri() -> String {
    "https://console.anthropic.com/oauth/code/callback".to_string()
}

fn default_scopes() -> String {
    "org:create_api_key user:profile user:inference".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 8787);
        assert_eq!(cfg.request_timeout_secs, 300);
        assert!(cfg.anthropic.api_url.ends_with("/v1/messages"));
        assert!(cfg.oauth.scopes.contains("user:inference"));
    }

    #[test]
    fn test_deserialize_partial_overrides() {
        let cfg: AppConfig = serde_json::from_value(serde_json::json!({
            "server": { "port": 9000 },
            "oauth": { "client_id": "test-client" }
        }))
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.oauth.client_id, "test-client");
        assert_eq!(cfg.oauth.token_url, default_token_url());
    }
}
