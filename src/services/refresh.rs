//! Background token refresh.
//!
//! A periodic task walks all known accounts and refreshes each stored token
//! independently. Per-account failures are recorded and never abort the
//! pass; the request path itself never refreshes inline.

use crate::core::error::Result;
use crate::services::account::AccountService;
use crate::services::oauth::OAuthService;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Outcome counts for one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Spawn the periodic refresh task.
pub fn spawn_refresh_task(
    accounts: Arc<AccountService>,
    oauth: Arc<OAuthService>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = refresh_all(&accounts, &oauth).await {
                tracing::warn!("token refresh pass could not enumerate accounts: {}", err);
            }
        }
    })
}

/// Refresh every account that has a stored token.
pub async fn refresh_all(
    accounts: &AccountService,
    oauth: &OAuthService,
) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary::default();

    for id in accounts.account_ids().await? {
        match accounts.token(&id).await {
            Ok(Some(_)) => match oauth.refresh(&id).await {
                Ok(()) => summary.refreshed += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(account_id = %id, "account token refresh failed: {}", err);
                }
            },
            Ok(None) => summary.skipped += 1,
            Err(err) => {
                summary.failed += 1;
                tracing::warn!(account_id = %id, "could not load account token: {}", err);
            }
        }
    }

    tracing::info!(
        refreshed = summary.refreshed,
        failed = summary.failed,
        skipped = summary.skipped,
        "token refresh pass complete"
    );
    Ok(summary)
}
