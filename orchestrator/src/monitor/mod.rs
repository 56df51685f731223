//! # Monitor
//!
//! The orchestrator-side background coordinator, separate from
//! the Supervisor's own health-check loop: every `poll_interval`, it
//! lists every live pipeline, fetches `STATUS` for each one (bounded by
//! a semaphore), converts reports into the `MetricPoint` schema shared
//! with `MetricSink`, batches them to the external time-series
//! store, and enforces the recordings root's disk quota. Store outages
//! spool to disk instead of losing points; `spool` replays them on
//! recovery. `disk_quota` implements the size-cap and max-age sweeps
//! over `<cache_root>/pipelines/*`.

pub mod disk_quota;
pub mod spool;

use crate::config::{OrchestratorConfig, Tunables};
use crate::metrics::MetricsRegistry;
use crate::store::TimeSeriesStore;
use crate::supervisor::Supervisor;
use orchestrator_domain::protocol::{Command, Response, StatusReport};
use orchestrator_domain::value_objects::{FieldValue, MetricPoint, PipelineId, RequestId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

/// Caps how long a single consecutive-failure backoff may grow to.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

pub struct Monitor {
    supervisor: Arc<Supervisor>,
    config: Arc<OrchestratorConfig>,
    tunables: Tunables,
    store: Arc<dyn TimeSeriesStore>,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
    buffer: Mutex<Vec<MetricPoint>>,
    last_flush: Mutex<Instant>,
    last_size_check: Mutex<Instant>,
    last_cleanup: Mutex<Instant>,
    background: Semaphore,
    spool_writes: AtomicU64,
}

impl Monitor {
    pub fn new(
        supervisor: Arc<Supervisor>,
        config: Arc<OrchestratorConfig>,
        store: Arc<dyn TimeSeriesStore>,
        metrics: Arc<MetricsRegistry>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let tunables = config.tunables.clone();
        let background_permits = tunables.monitor_max_background_workers.max(1);
        Arc::new(Self {
            supervisor,
            config,
            tunables,
            store,
            metrics,
            shutdown,
            buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(Instant::now()),
            last_size_check: Mutex::new(Instant::now()),
            last_cleanup: Mutex::new(Instant::now()),
            background: Semaphore::new(background_permits),
            spool_writes: AtomicU64::new(0),
        })
    }

    /// Replays any spool files left over from a prior outage, in
    /// timestamp order, deleting each on successful write.
    pub async fn replay_backlog(&self) {
        let dir = spool::spool_dir(&self.config.output_dir);
        let files = match spool::list_spool_files(&dir) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list metrics spool directory");
                return;
            }
        };
        for file in files {
            match spool::read_spool_file(&file) {
                Ok(points) => match self.store.write_points(points).await {
                    Ok(()) => {
                        if let Err(e) = std::fs::remove_file(&file) {
                            tracing::warn!(path = %file.display(), error = %e, "failed to remove replayed spool file");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %file.display(), error = %e, "replay write failed, will retry on next startup");
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "failed to parse spool file, leaving in place");
                }
            }
        }
    }

    /// Runs the main loop until `shutdown` is cancelled, then joins any
    /// outstanding background flush/cleanup work (bounded by
    /// `monitor_max_background_workers`) with `PROCESS_JOIN_TIMEOUT`-like
    /// discipline via the semaphore's natural drain.
    pub async fn run(self: Arc<Self>) {
        self.replay_backlog().await;

        let mut consecutive_failures: u32 = 0;
        loop {
            let tick_started = Instant::now();
            match self.poll_once().await {
                Ok(()) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::error!(error = %e, consecutive_failures, "monitor poll iteration failed");
                }
            }

            let base_interval = self.tunables.monitor_poll_interval();
            let backoff = if consecutive_failures > 0 {
                (base_interval * 2u32.saturating_pow(consecutive_failures.min(16))).min(MAX_BACKOFF)
            } else {
                base_interval
            };
            let elapsed = tick_started.elapsed();
            let sleep_for = backoff.saturating_sub(elapsed);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.shutdown.cancelled() => {
                    self.flush_remaining().await;
                    return;
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<(), orchestrator_domain::OrchestratorError> {
        let ids = self.supervisor.list_pipelines().await;
        self.poll_ids(ids).await;
        self.maybe_flush().await;
        self.maybe_check_disk_quota().await;
        self.maybe_cleanup_old_pipelines().await;
        Ok(())
    }

    /// Fetches `STATUS` for every id concurrently, bounded by
    /// `monitor_semaphore_permits`, and appends the
    /// resulting metric points to the shared buffer.
    async fn poll_ids(&self, ids: Vec<PipelineId>) {
        let permits = Arc::new(Semaphore::new(self.tunables.monitor_semaphore_permits.max(1)));
        let mut handles = Vec::with_capacity(ids.len());

        for id in ids {
            let permits = permits.clone();
            let supervisor = self.supervisor.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                let response = supervisor.handle_command(RequestId::new(), Command::Status { pipeline_id: id }).await;
                match response {
                    Ok(Response::Status { report }) => Some((id, report)),
                    _ => None,
                }
            }));
        }

        let mut points = Vec::new();
        for handle in handles {
            if let Ok(Some((id, report))) = handle.await {
                points.extend(report_to_points(id, &report));
            }
        }

        if !points.is_empty() {
            self.buffer.lock().await.extend(points);
        }
    }

    async fn maybe_flush(&self) {
        let should_flush = {
            let buffer = self.buffer.lock().await;
            let last_flush = *self.last_flush.lock().await;
            buffer.len() >= self.tunables.monitor_metrics_batch_size
                || (!buffer.is_empty() && last_flush.elapsed() >= self.tunables.monitor_metrics_flush_interval())
        };
        if !should_flush {
            return;
        }

        let drained = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        *self.last_flush.lock().await = Instant::now();
        self.write_batch(drained).await;
    }

    /// Flushes anything left in the buffer; called once on shutdown so
    /// no polled points are silently lost at process exit.
    async fn flush_remaining(&self) {
        let drained = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if !drained.is_empty() {
            self.write_batch(drained).await;
        }
    }

    /// Writes one batch to the store in a background task; on failure
    /// the batch is spooled to disk instead of being dropped.
    async fn write_batch(&self, batch: Vec<MetricPoint>) {
        if batch.is_empty() {
            return;
        }
        let Ok(_permit) = self.background.acquire().await else { return };
        match self.store.write_points(batch.clone()).await {
            Ok(()) => {
                self.metrics.active_pipelines.set(self.supervisor.pipeline_count() as i64);
            }
            Err(e) => {
                tracing::error!(error = %e, count = batch.len(), "monitor store write failed, spooling to disk");
                let seq = self.spool_writes.fetch_add(1, Ordering::Relaxed);
                if let Err(spool_err) = spool::write_spool_file(&self.config.output_dir, seq, &batch) {
                    tracing::error!(error = %spool_err, "failed to spool metrics batch, points lost");
                }
            }
        }
    }

    async fn maybe_check_disk_quota(&self) {
        let interval = Duration::from_secs(self.tunables.pipeline_size_check_interval_secs.max(1));
        let mut last = self.last_size_check.lock().await;
        if last.elapsed() < interval {
            return;
        }
        *last = Instant::now();
        drop(last);

        let cache_root = self.config.cache_root.clone();
        let max_bytes = (self.tunables.pipeline_max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64;
        if let Err(e) = disk_quota::enforce_size_cap(std::path::Path::new(&cache_root), max_bytes) {
            tracing::warn!(error = %e, "disk quota enforcement failed");
        }
    }

    async fn maybe_cleanup_old_pipelines(&self) {
        let interval = Duration::from_secs(self.tunables.pipeline_cleanup_interval_secs.max(1));
        let mut last = self.last_cleanup.lock().await;
        if last.elapsed() < interval {
            return;
        }
        *last = Instant::now();
        drop(last);

        let cache_root = self.config.cache_root.clone();
        let max_age = Duration::from_secs(u64::from(self.tunables.pipeline_results_max_days) * 86_400);
        if let Err(e) = disk_quota::remove_older_than(std::path::Path::new(&cache_root), max_age) {
            tracing::warn!(error = %e, "pipeline age-based cleanup failed");
        }
    }
}

/// Converts one `STATUS` report into the `MetricPoint` schema:
/// one pipeline-level point (`inference_throughput`) plus one
/// source-level point per entry in `sources_metadata`.
fn report_to_points(pipeline_id: PipelineId, report: &StatusReport) -> Vec<MetricPoint> {
    let now = chrono::Utc::now();
    let mut points = Vec::with_capacity(1 + report.sources_metadata.len());

    points.push(
        MetricPoint::pipeline_point("pipeline_status", pipeline_id, now)
            .with_field("inference_throughput", FieldValue::from_float(report.inference_throughput)),
    );

    for source in &report.sources_metadata {
        points.push(
            MetricPoint::source_point("source_status", pipeline_id, source.source_id.clone(), now)
                .with_field("state", FieldValue::String(format!("{:?}", source.state))),
        );
    }

    points
}
