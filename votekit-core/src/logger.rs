//! Tracing setup for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

/// Initializes a global `tracing` subscriber with an env-filter.
///
/// Reads `RUST_LOG` when set, otherwise falls back to `default_directive`
/// (e.g. `"votekit_core=info"`). Safe to call more than once; only the first
/// call installs a subscriber.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
