//! # Orchestrator Operational Metrics
//!
//! A Prometheus registry exposing the orchestrator's own health — active
//! pipeline count, warm-pool size, command latencies, health-check sweep
//! duration, sink counters — distinct from the per-pipeline `MetricPoint`
//! time series the Monitor writes to the external store.
//! This is ambient observability of the core itself, carried even though
//! a distributed metrics/consensus system across orchestrator instances
//! is explicitly out of scope.

pub mod endpoint;

use prometheus::{HistogramVec, IntGauge, IntGaugeVec, Registry};
use std::sync::Arc;

pub struct MetricsRegistry {
    pub registry: Registry,
    pub active_pipelines: IntGauge,
    pub warm_pool_idle: IntGauge,
    pub command_latency_seconds: HistogramVec,
    pub health_sweep_seconds: prometheus::Histogram,
    pub sink_counters: IntGaugeVec,
    /// Sum of the most recent per-pipeline RAM sample taken by each
    /// health-check sweep, across every pipeline sampled that sweep.
    pub total_worker_rss_bytes: IntGauge,
}

impl MetricsRegistry {
    pub fn new() -> Arc<Self> {
        let registry = Registry::new();

        let active_pipelines =
            IntGauge::new("orchestrator_active_pipelines", "Number of pipelines currently tracked").unwrap();
        let warm_pool_idle =
            IntGauge::new("orchestrator_warm_pool_idle", "Number of idle warm-pool workers").unwrap();
        let command_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "orchestrator_command_latency_seconds",
                "Command routing latency by command type",
            ),
            &["command"],
        )
        .unwrap();
        let health_sweep_seconds = prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
            "orchestrator_health_sweep_seconds",
            "Wall-clock duration of one health-check sweep",
        ))
        .unwrap();
        let sink_counters = IntGaugeVec::new(
            prometheus::Opts::new("orchestrator_sink_counter", "Per-sink enqueued/dropped/errors counters"),
            &["pipeline_id", "sink", "counter"],
        )
        .unwrap();
        let total_worker_rss_bytes = IntGauge::new(
            "orchestrator_total_worker_rss_bytes",
            "Sum of each pipeline's most recently sampled worker RSS, across the last health-check sweep",
        )
        .unwrap();

        registry.register(Box::new(active_pipelines.clone())).unwrap();
        registry.register(Box::new(warm_pool_idle.clone())).unwrap();
        registry.register(Box::new(command_latency_seconds.clone())).unwrap();
        registry.register(Box::new(health_sweep_seconds.clone())).unwrap();
        registry.register(Box::new(sink_counters.clone())).unwrap();
        registry.register(Box::new(total_worker_rss_bytes.clone())).unwrap();

        Arc::new(Self {
            registry,
            active_pipelines,
            warm_pool_idle,
            command_latency_seconds,
            health_sweep_seconds,
            sink_counters,
            total_worker_rss_bytes,
        })
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Arc::try_unwrap(Self::new()).unwrap_or_else(|arc| (*arc).clone_shallow())
    }
}

impl MetricsRegistry {
    /// Cheap shallow clone used only by `Default`, which cannot return an
    /// `Arc` directly; every field here is itself a cheap-clone handle.
    fn clone_shallow(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            active_pipelines: self.active_pipelines.clone(),
            warm_pool_idle: self.warm_pool_idle.clone(),
            command_latency_seconds: self.command_latency_seconds.clone(),
            health_sweep_seconds: self.health_sweep_seconds.clone(),
            sink_counters: self.sink_counters.clone(),
            total_worker_rss_bytes: self.total_worker_rss_bytes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_constructs_without_panicking() {
        let metrics = MetricsRegistry::new();
        metrics.active_pipelines.set(3);
        assert_eq!(metrics.active_pipelines.get(), 3);
    }
}
