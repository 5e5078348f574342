//! Logging setup
//!
//! `tracing` output filtered by `RUST_LOG`, e.g.
//! `RUST_LOG=rowpick_engine=debug`.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber; false if one is already installed
pub fn init() -> bool {
    init_with_filter(DEFAULT_FILTER)
}

pub fn init_with_filter(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
