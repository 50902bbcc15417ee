//! Tracing setup for front ends embedding the pipeline
//!
//! The library itself only emits `tracing` events. Binaries and tests call
//! `init_tracing` once to get them on stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a compact stderr subscriber
///
/// Reads `RUST_LOG`; falls back to `default_filter` when unset. Calling it
/// more than once is harmless: later calls leave the first subscriber in place.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
