//! # Configuration Descriptor
//!
//! Resolves `OrchestratorConfig` from three layered sources, later source
//! wins: an optional file (`--config`), `CORAL_*` environment variables,
//! then `--set KEY=VALUE` CLI overrides. This mirrors the original
//! deployment's `RuntimeDescriptor` resolution order (file → env →
//! overrides), built on the `config` crate's layered-source builder.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix every tunable and feature toggle resolves
/// under.
pub const ENV_PREFIX: &str = "CORAL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub platform: String,
    pub enable_stream_manager_patch: bool,
    pub enable_camera_patch: bool,
    pub enable_sink_patch: bool,
    pub enable_webrtc_patch: bool,
    pub enable_plugins_patch: bool,
    pub enable_buffer_sink_patch: bool,
    pub enable_metric_sink_patch: bool,
    pub enable_video_sink_patch: bool,
    pub auto_patch_rknn: bool,
    pub auto_discover_backends: bool,
    pub backend_entry_modules: Vec<String>,
    pub extra_patches: Vec<String>,
    pub services: HashMap<String, serde_json::Value>,

    pub tunables: Tunables,

    /// Root directory for `<cache_root>/pipelines/<pipeline_id>/...`.
    pub cache_root: String,
    /// Root directory the Monitor enforces disk quota over and where
    /// `metrics_backup/` spool files are written.
    pub output_dir: String,

    pub warm_pool_size: usize,

    /// Opt-in `CONSUME_RESULT` mirroring to
    /// `results/batch_<millis>.json`, off by default and
    /// independent of the time-series metrics path.
    pub results_spool: ResultsSpoolConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResultsSpoolConfig {
    pub enabled: bool,
}

impl Default for ResultsSpoolConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            platform: "generic".to_string(),
            enable_stream_manager_patch: true,
            enable_camera_patch: true,
            enable_sink_patch: true,
            enable_webrtc_patch: true,
            enable_plugins_patch: true,
            enable_buffer_sink_patch: true,
            enable_metric_sink_patch: true,
            enable_video_sink_patch: true,
            auto_patch_rknn: false,
            auto_discover_backends: true,
            backend_entry_modules: Vec::new(),
            extra_patches: Vec::new(),
            services: HashMap::new(),
            tunables: Tunables::default(),
            cache_root: "./var/cache".to_string(),
            output_dir: "./var/output".to_string(),
            warm_pool_size: 0,
            results_spool: ResultsSpoolConfig::default(),
        }
    }
}

/// Every timeout/threshold the orchestrator depends on, each overridable
/// by its `STREAM_MANAGER_*` / `PIPELINE_*` environment variable or
/// `--set` key (lower-cased, same name) without a code change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tunables {
    pub stream_manager_queue_timeout_secs: u64,
    pub stream_manager_health_check_timeout_secs: u64,
    pub stream_manager_max_health_failures: u32,
    pub stream_manager_process_join_timeout_secs: u64,
    pub stream_manager_termination_grace_period_secs: u64,
    pub pipeline_monitor_interval_secs: f64,
    pub pipeline_results_max_days: u32,
    pub pipeline_cleanup_interval_secs: u64,
    pub pipeline_max_size_gb: f64,
    pub pipeline_size_check_interval_secs: u64,

    pub health_check_tick_secs: u64,
    pub warm_pool_tick_secs: u64,
    pub response_read_retries: u32,

    pub video_segment_duration_secs: u64,
    pub video_max_total_size_bytes: u64,
    pub video_max_disk_usage_ratio: f64,

    pub metric_batch_size: usize,
    pub metric_flush_interval_secs: f64,

    pub webrtc_processing_timeout_secs: f64,
    pub webrtc_max_consecutive_timeouts: u32,
    pub webrtc_min_consecutive_on_time: u32,

    pub monitor_poll_interval_secs: f64,
    pub monitor_semaphore_permits: usize,
    pub monitor_metrics_batch_size: usize,
    pub monitor_metrics_flush_interval_secs: f64,
    pub monitor_max_background_workers: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            stream_manager_queue_timeout_secs: 10,
            stream_manager_health_check_timeout_secs: 10,
            stream_manager_max_health_failures: 3,
            stream_manager_process_join_timeout_secs: 30,
            stream_manager_termination_grace_period_secs: 5,
            pipeline_monitor_interval_secs: 0.1,
            pipeline_results_max_days: 7,
            pipeline_cleanup_interval_secs: 3600,
            pipeline_max_size_gb: 10.0,
            pipeline_size_check_interval_secs: 60,

            health_check_tick_secs: 1,
            warm_pool_tick_secs: 1,
            response_read_retries: 3,

            video_segment_duration_secs: 300,
            video_max_total_size_bytes: 10 * 1024 * 1024 * 1024,
            video_max_disk_usage_ratio: 0.8,

            metric_batch_size: 100,
            metric_flush_interval_secs: 1.0,

            webrtc_processing_timeout_secs: 0.1,
            webrtc_max_consecutive_timeouts: 30,
            webrtc_min_consecutive_on_time: 5,

            monitor_poll_interval_secs: 0.1,
            monitor_semaphore_permits: 10,
            monitor_metrics_batch_size: 100,
            monitor_metrics_flush_interval_secs: 1.0,
            monitor_max_background_workers: 5,
        }
    }
}

impl Tunables {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_manager_queue_timeout_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_manager_health_check_timeout_secs)
    }

    pub fn process_join_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_manager_process_join_timeout_secs)
    }

    pub fn termination_grace_period(&self) -> Duration {
        Duration::from_secs(self.stream_manager_termination_grace_period_secs)
    }

    pub fn video_segment_duration(&self) -> Duration {
        Duration::from_secs(self.video_segment_duration_secs)
    }

    pub fn metric_flush_interval(&self) -> Duration {
        Duration::from_secs_f64(self.metric_flush_interval_secs)
    }

    pub fn webrtc_processing_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.webrtc_processing_timeout_secs)
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_poll_interval_secs)
    }

    pub fn monitor_metrics_flush_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_metrics_flush_interval_secs)
    }
}

/// Resolves `OrchestratorConfig` from an optional file, then `CORAL_*`
/// environment variables (unless `no_env`), then `--set KEY=VALUE`
/// overrides, each later source winning.
pub fn resolve_config(
    file: Option<&Path>,
    overrides: &[(String, String)],
    no_env: bool,
) -> Result<OrchestratorConfig, orchestrator_domain::OrchestratorError> {
    let mut builder = config::Config::builder().add_source(config::Config::try_from(&OrchestratorConfig::default())
        .map_err(|e| orchestrator_domain::OrchestratorError::internal_error(format!("default config: {e}")))?);

    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    if !no_env {
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true),
        );
    }

    for (key, value) in overrides {
        builder = builder
            .set_override(key.as_str(), value.as_str())
            .map_err(|e| orchestrator_domain::OrchestratorError::invalid_payload(format!("--set {key}: {e}")))?;
    }

    let resolved = builder
        .build()
        .map_err(|e| orchestrator_domain::OrchestratorError::invalid_payload(format!("config resolution: {e}")))?;

    resolved
        .try_deserialize()
        .map_err(|e| orchestrator_domain::OrchestratorError::invalid_payload(format!("config shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.tunables.stream_manager_queue_timeout_secs, 10);
        assert_eq!(config.tunables.stream_manager_max_health_failures, 3);
        assert_eq!(config.tunables.video_max_total_size_bytes, 10 * 1024 * 1024 * 1024);
        assert_eq!(config.tunables.metric_batch_size, 100);
    }

    #[test]
    fn test_resolve_config_applies_overrides() {
        let overrides = vec![("warm_pool_size".to_string(), "4".to_string())];
        let resolved = resolve_config(None, &overrides, true).unwrap();
        assert_eq!(resolved.warm_pool_size, 4);
    }

    #[test]
    fn test_resolve_config_without_overrides_is_default() {
        let resolved = resolve_config(None, &[], true).unwrap();
        assert_eq!(resolved, OrchestratorConfig::default());
    }
}
