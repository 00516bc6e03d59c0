//! Tracing subscriber setup for hosts that do not install their own.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogSettings;

const FALLBACK_FILTER: &str = "sdmusic=info";

/// `RUST_LOG` wins over the configured directive; an unparsable directive
/// falls back to `sdmusic=info`.
fn filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER))
}

/// Install a global fmt subscriber.
///
/// Returns `false` when a global subscriber was already set, in which case
/// that one keeps receiving the crate's events.
pub fn init(settings: &LogSettings) -> bool {
    tracing_subscriber::registry()
        .with(filter(settings))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
