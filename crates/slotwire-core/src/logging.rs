//! Subscriber setup for applications embedding slotwire.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! application's decision. With the `tracing-json` feature these helpers
//! install a formatter filtered by `RUST_LOG`, falling back to
//! [`DEFAULT_FILTER`].

#[cfg(feature = "tracing-json")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "tracing-json")]
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "slotwire_core=info,slotwire_runtime=info";

/// Install a global JSON subscriber. Returns false if one was already set.
#[cfg(feature = "tracing-json")]
pub fn init_json() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .with_current_span(false)
        .try_init()
        .is_ok()
}

/// Install a global human-readable subscriber. Returns false if one was
/// already set.
#[cfg(feature = "tracing-json")]
pub fn init_pretty() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .try_init()
        .is_ok()
}
