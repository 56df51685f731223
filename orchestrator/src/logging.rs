//! # Logging
//!
//! Initializes the process-wide `tracing` subscriber exactly once, at
//! startup. Every component logs through `tracing`'s structured fields
//! (`pipeline_id`, `request_id`, `source_id` where applicable); `RUST_LOG`
//! overrides the bootstrap-phase default level.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Safe to call once per process; a
/// second call is a no-op (the error from `try_init` is swallowed since
/// tests may initialize logging multiple times across the same binary).
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}
