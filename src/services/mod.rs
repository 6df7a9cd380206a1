//! Business logic for the relay.
//!
//! - [`account`]: account registry and credential selection
//! - [`oauth`]: PKCE login, code exchange, token refresh
//! - [`provider`]: provider registry and route-target selection
//! - [`proxy`]: request dispatch to the selected upstream
//! - [`refresh`]: background token refresh

pub mod account;
pub mod oauth;
pub mod provider;
pub mod proxy;
pub mod refresh;

pub use account::{Account, AccountService, AccountStatus, AccountView, StoredToken};
pub use oauth::{LoginStart, OAuthService, PkceSession};
pub use provider::{NewProvider, ProviderRecord, ProviderService, ProviderUpdate, RouteTarget};
pub use proxy::ProxyService;
pub use refresh::{refresh_all, spawn_refresh_task, RefreshSummary};
