//! Claude Relay - a protocol-shifting proxy for the Claude Messages API
//!
//! This library relays Messages-API requests to either the official API
//! (bearer passthrough using stored OAuth credentials) or to configured
//! OpenAI-compatible providers, translating requests and responses,
//! streamed ones included, back into the Messages shape. Features include:
//!
//! - **Protocol translation**: bidirectional mapping between the Claude
//!   Messages shape and the OpenAI chat-completion shape
//! - **Streaming re-encoding**: a stateful SSE transducer with exactly-once
//!   termination under every end condition
//! - **Multi-account OAuth**: PKCE login, expiry tracking, and background
//!   refresh across any number of stored accounts
//! - **Provider registry**: per-entity records in a key-value store with
//!   compare-and-swap index maintenance
//!
//! # Architecture
//!
//! The codebase is organized into four layers:
//!
//! - [`core`]: configuration, errors, logging, key-value storage
//! - [`transformer`]: the two message shapes and the conversion engine
//! - [`services`]: accounts, OAuth, providers, dispatch, background refresh
//! - [`api`]: the thin HTTP shell over the services
//!
//! # Configuration
//!
//! All settings are environment-driven with sensible defaults; see
//! [`core::config::AppConfig`]. Notable variables:
//! - `RELAY_SERVER__PORT`: bind port (default: 8787)
//! - `RELAY_OAUTH__CLIENT_ID`: OAuth client id for account logins
//! - `RELAY_TOKEN_REFRESH_INTERVAL_SECS`: background refresh cadence

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use crate::api::{build_router, AppState};
pub use crate::core::{AppConfig, AppError, KvStore, MemoryStore, Result};
pub use crate::services::{
    AccountService, OAuthService, ProviderService, ProxyService, RouteTarget,
};
pub use crate::transformer::{ClaudeRequest, ClaudeResponse, TransformerRegistry};
