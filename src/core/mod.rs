//! Core functionality for the relay.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling
//! - Logging initialization
//! - Key-value storage abstraction

pub mod config;
pub mod error;
pub mod logging;
pub mod store;

// Re-export commonly used types
pub use config::{AnthropicConfig, AppConfig, OAuthConfig, ServerConfig};
pub use error::{AppError, Result};
pub use store::{KvStore, MemoryStore};

/// Current time as milliseconds since the Unix epoch.
///
/// All persisted timestamps (`created_at`, `expires_at`, `obtained_at`)
/// use this unit.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
