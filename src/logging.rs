//! `tracing` subscriber setup.
//!
//! The library only emits events; installing a subscriber is up to the host.
//! These helpers cover the common cases.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber. `RUST_LOG` takes precedence over `filter`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// Like [`init`], but writes through the test harness so output is captured
pub fn init_for_tests() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}
