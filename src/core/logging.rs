//! Logging initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` controls the base filter (default: info, with this crate at
/// debug). Noisy HTTP library logs are always suppressed, even when the
/// base filter is broad.
pub fn init() {
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,claude_relay=debug".to_string());

    let filter_str = format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    );

    let no_color = std::env::var("NO_COLOR").is_ok();

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter_str))
        .with(tracing_subscriber::fmt::layer().with_ansi(!no_color))
        .init();
}
