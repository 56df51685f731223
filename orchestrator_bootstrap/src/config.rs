//! # Bootstrap Configuration
//!
//! A thin, bootstrap-phase configuration value — the handful of settings
//! needed before the full `OrchestratorConfig` descriptor (resolved by
//! `pipeline-orchestrator::infrastructure::config`) can be loaded: whether
//! to run verbosely, and the config file path the caller passed on the
//! command line.
//!
//! This intentionally does not know about pipelines, sinks, or the wire
//! protocol — those belong to the application layer.

use std::path::PathBuf;

/// Bootstrap-phase settings derived from `ValidatedCli`
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub verbose: bool,
    pub config_path: Option<PathBuf>,
}

impl BootstrapConfig {
    pub fn new(verbose: bool, config_path: Option<PathBuf>) -> Self {
        Self { verbose, config_path }
    }

    /// Tracing filter directive to install before application config is
    /// resolved (`debug` under `-v`, `info` otherwise); `RUST_LOG` still
    /// takes precedence when set, per `logger::init`.
    pub fn default_log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
