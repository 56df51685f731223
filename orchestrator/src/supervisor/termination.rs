//! # Termination Protocol
//!
//! The three-phase shutdown fan-out: mark every pipeline for
//! removal and request termination, sleep the grace period, then kill
//! anything still alive and join with a watchdog thread so one stuck
//! worker cannot block the whole teardown. `force_cleanup` is the
//! best-effort single-pipeline version the health-check loop calls.

use crate::config::Tunables;
use crate::supervisor::routing::route_command;
use crate::supervisor::table::ProcessesTable;
use orchestrator_domain::protocol::Command;
use orchestrator_domain::value_objects::{PipelineId, RequestId};
use std::sync::Arc;
use std::time::Duration;

/// Phase 1+2+3 of the Supervisor-wide shutdown.
pub async fn shutdown_all(table: Arc<ProcessesTable>, tunables: &Tunables) {
    let ids = table.snapshot_ids();

    // Phase 1: mark for removal, request graceful termination.
    for &id in &ids {
        table.mark_for_removal(id);
        let table = table.clone();
        tokio::spawn(async move {
            let _ = route_command(&table, id, RequestId::new(), Command::Terminate { pipeline_id: id }, Duration::from_secs(2)).await;
        });
    }

    // Phase 2: grace period.
    tokio::time::sleep(tunables.termination_grace_period()).await;

    // Phase 3: kill anything still alive, join with a watchdog timeout,
    // always remove the row.
    let join_timeout = tunables.process_join_timeout();
    let mut joins = Vec::new();
    for &id in &ids {
        let table = table.clone();
        joins.push(tokio::spawn(async move {
            kill_and_join(&table, id, join_timeout).await;
        }));
    }
    for handle in joins {
        let _ = handle.await;
    }
}

async fn kill_and_join(table: &Arc<ProcessesTable>, id: PipelineId, join_timeout: Duration) {
    // The row must come out of the table no matter how this function
    // exits, including an early return added later or a panic in the
    // kill/join sequence above it.
    let table_guard = table.clone();
    let _remove_on_exit = scopeguard::guard((), move |_| table_guard.remove(id));

    if let Some(child) = table.child_handle(id) {
        let mut guard = child.lock().await;
        if matches!(guard.try_wait(), Ok(None)) {
            let _ = guard.start_kill();
        }
        let _ = tokio::time::timeout(join_timeout, guard.wait()).await;
    }
}

/// Best-effort single-pipeline cleanup the health-check loop schedules:
/// terminate, wait briefly, kill, always remove the row. Never panics;
/// every failure is logged, not propagated.
pub async fn force_cleanup(table: &Arc<ProcessesTable>, id: PipelineId) {
    let table_guard = table.clone();
    let _remove_on_exit = scopeguard::guard((), move |_| {
        table_guard.remove(id);
        tracing::info!(pipeline_id = %id, "pipeline force-cleaned");
    });

    let _ = route_command(table, id, RequestId::new(), Command::Terminate { pipeline_id: id }, Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    if let Some(child) = table.child_handle(id) {
        let mut guard = child.lock().await;
        if matches!(guard.try_wait(), Ok(None)) {
            if let Err(e) = guard.start_kill() {
                tracing::warn!(pipeline_id = %id, error = %e, "force-cleanup kill failed");
            }
            let _ = guard.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_force_cleanup_removes_unknown_pipeline_without_panicking() {
        let table = Arc::new(ProcessesTable::new());
        force_cleanup(&table, PipelineId::new()).await;
        assert!(table.is_empty());
    }
}
