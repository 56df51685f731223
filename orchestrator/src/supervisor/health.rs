//! # Health-Check Loop
//!
//! Ticks every `health_check_tick_secs` (100ms shutdown-check granularity):
//! snapshots the table, samples RAM, issues `STATUS` through
//! the normal routing path, tracks consecutive failures, detects
//! all-sources-terminal pipelines for async termination, and schedules
//! force-cleanup for anything past `MAX_HEALTH_FAILURES` or a dead
//! worker process. Cleanups are applied after the sweep, outside the
//! per-pipeline work, so the table lock is never held across I/O.
//!
//! Each pipeline's RAM sample is appended to its own ring
//! (`PipelineHealth::push_ram_sample`) and also summed across every
//! pipeline sampled that sweep into `MetricsRegistry::total_worker_rss_bytes`,
//! so the orchestrator's own `/metrics` endpoint exposes aggregate worker
//! memory pressure alongside the per-pipeline history.

use crate::config::Tunables;
use crate::metrics::MetricsRegistry;
use crate::supervisor::table::ProcessesTable;
use crate::supervisor::termination::force_cleanup;
use orchestrator_domain::protocol::{Command, Response};
use orchestrator_domain::value_objects::{PipelineId, RequestId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_CHECK_GRANULARITY: Duration = Duration::from_millis(100);

pub async fn run(table: Arc<ProcessesTable>, tunables: Tunables, metrics: Arc<MetricsRegistry>, shutdown: CancellationToken) {
    let tick = Duration::from_secs(tunables.health_check_tick_secs.max(1));
    loop {
        if sleep_respecting_shutdown(tick, &shutdown).await.is_break() {
            return;
        }

        let started = Instant::now();
        sweep_once(&table, &tunables, &metrics).await;
        let elapsed = started.elapsed();
        metrics.health_sweep_seconds.observe(elapsed.as_secs_f64());
        if elapsed > Duration::from_secs(5) {
            tracing::warn!(elapsed_ms = elapsed.as_millis(), "health-check sweep exceeded 5s budget");
        }
    }
}

async fn sleep_respecting_shutdown(total: Duration, shutdown: &CancellationToken) -> std::ops::ControlFlow<()> {
    let mut remaining = total;
    while !remaining.is_zero() {
        let slice = remaining.min(SHUTDOWN_CHECK_GRANULARITY);
        tokio::select! {
            _ = tokio::time::sleep(slice) => {}
            _ = shutdown.cancelled() => return std::ops::ControlFlow::Break(()),
        }
        remaining -= slice;
    }
    std::ops::ControlFlow::Continue(())
}

async fn sweep_once(table: &Arc<ProcessesTable>, tunables: &Tunables, metrics: &Arc<MetricsRegistry>) {
    let ids = table.snapshot_ids();
    let mut to_cleanup = Vec::new();
    let mut total_rss: u64 = 0;

    for id in ids {
        let outcome = check_one(table, id, tunables).await;
        total_rss += outcome.rss_sample.unwrap_or(0);
        if outcome.needs_cleanup {
            to_cleanup.push(id);
        }
    }
    metrics.total_worker_rss_bytes.set(total_rss as i64);

    for id in to_cleanup {
        force_cleanup(table, id).await;
    }
}

struct CheckOutcome {
    needs_cleanup: bool,
    /// This pipeline's sampled RAM this sweep, if it was sampled at all
    /// (idle/removed/untracked pipelines contribute nothing).
    rss_sample: Option<u64>,
}

impl CheckOutcome {
    fn skip() -> Self {
        Self { needs_cleanup: false, rss_sample: None }
    }
}

async fn check_one(table: &Arc<ProcessesTable>, id: PipelineId, tunables: &Tunables) -> CheckOutcome {
    let Some(handles) = table.routing_handles(id) else { return CheckOutcome::skip() };
    if handles.marked_for_removal {
        return CheckOutcome::skip();
    }

    let is_idle = table.with_record_mut(id, |r| r.is_idle).unwrap_or(true);
    if is_idle {
        return CheckOutcome::skip();
    }

    if let Some(child) = table.child_handle(id) {
        let mut guard = child.lock().await;
        if let Ok(Some(_status)) = guard.try_wait() {
            tracing::warn!(pipeline_id = %id, "worker process is no longer alive");
            return CheckOutcome { needs_cleanup: true, rss_sample: None };
        }
    }

    let mut rss_sample = None;
    if let Some(pid) = table.with_record_mut(id, |r| r.worker_pid) {
        if let Some(rss) = sample_rss(pid) {
            table.with_health_mut(id, |h| h.push_ram_sample(rss));
            rss_sample = Some(rss);
        }
    }

    let started = Instant::now();
    let outcome = crate::supervisor::routing::route_command(
        table,
        id,
        RequestId::new(),
        Command::Status { pipeline_id: id },
        tunables.queue_timeout(),
    )
    .await;
    let elapsed = started.elapsed();

    let timed_out = elapsed > tunables.health_check_timeout();
    let failed = timed_out || !matches!(outcome, Ok(Response::Status { .. }));

    if failed {
        let should_cleanup = table.with_health_mut(id, |h| h.record_failure(tunables.stream_manager_max_health_failures)).unwrap_or(false);
        if should_cleanup {
            tracing::warn!(pipeline_id = %id, "pipeline exceeded max health failures");
        }
        return CheckOutcome { needs_cleanup: should_cleanup, rss_sample };
    }

    table.with_health_mut(id, |h| h.record_success());

    if let Ok(Response::Status { report }) = outcome {
        if !report.sources_metadata.is_empty() && report.sources_metadata.iter().all(|s| s.state.is_terminal()) {
            let table = table.clone();
            tokio::spawn(async move {
                tracing::info!(pipeline_id = %id, "all sources terminal, spawning async termination");
                let _ = crate::supervisor::routing::route_command(
                    &table,
                    id,
                    RequestId::new(),
                    Command::Terminate { pipeline_id: id },
                    Duration::from_secs(10),
                )
                .await;
            });
        }
    }

    CheckOutcome { needs_cleanup: false, rss_sample }
}

#[cfg(not(target_os = "linux"))]
fn sample_rss(_pid: u32) -> Option<u64> {
    None
}

#[cfg(target_os = "linux")]
fn sample_rss(pid: u32) -> Option<u64> {
    use sysinfo::{Pid, System};
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.memory())
}
