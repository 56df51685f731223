//! # Warm Pool Maintenance
//!
//! A background loop that keeps `warm_pool_size` idle workers ready to
//! be bound to an incoming `INIT`. Each tick counts idle,
//! non-marked pipelines; if below the target, it spawns one fresh worker
//! and registers it. Shutdown-signal aware, like the health loop.

use crate::config::{OrchestratorConfig, Tunables};
use crate::metrics::MetricsRegistry;
use crate::supervisor::table::ProcessesTable;
use crate::worker::spawn::spawn_worker;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn run(
    table: Arc<ProcessesTable>,
    config: Arc<OrchestratorConfig>,
    tunables: Tunables,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
) {
    let tick = Duration::from_secs(tunables.warm_pool_tick_secs.max(1));
    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = shutdown.cancelled() => return,
        }

        let idle = table.idle_non_marked_count();
        metrics.warm_pool_idle.set(idle as i64);

        if idle >= config.warm_pool_size {
            continue;
        }

        match spawn_worker(&config).await {
            Ok(row) => {
                let id = row.record.pipeline_id;
                table.insert(row);
                tracing::info!(pipeline_id = %id, "spawned warm-pool worker");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn warm-pool worker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warm_pool_counts_only_idle_non_marked() {
        let table = ProcessesTable::new();
        assert_eq!(table.idle_non_marked_count(), 0);
    }
}
