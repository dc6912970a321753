//! Tracing setup for the engine binaries.
//!
//! Diagnostics only: output goes to stderr and is filtered by `RUST_LOG`.
//! Command output and progress are never routed through tracing.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `default_filter` when unset or invalid.
///
/// # Example
/// ```bash
/// RUST_LOG=sandbox_engine=debug sandbox-engine exec 1 1 "ls -la"
/// ```
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
