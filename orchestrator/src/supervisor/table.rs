//! # Processes Table
//!
//! `ProcessesTable` is the Supervisor's single coarse-locked map from
//! `PipelineId` to a `WorkerRow`, pairing the domain's
//! `ManagedPipelineRecord` bookkeeping with the `PipelineHealth` entry
//! and the transport/operation-lock handles an actual worker needs.
//! Keeping both domain rows under one `parking_lot::Mutex` preserves the
//! invariant "a pipeline exists in `PipelineHealth` iff it exists in
//! `ProcessesTable`" by construction — there is only one map.
//!
//! Mutations snapshot the key set, release the lock, then act on the
//! snapshot — the health-check loop and warm-pool maintenance never hold
//! this lock across a command round-trip or process spawn.

use orchestrator_domain::entities::{ManagedPipelineRecord, PipelineHealth};
use orchestrator_domain::value_objects::PipelineId;
use orchestrator_domain::CommandTransport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::process::Child;

/// Everything the Supervisor needs to route commands to, and tear down,
/// one worker.
pub struct WorkerRow {
    pub record: ManagedPipelineRecord,
    pub health: PipelineHealth,
    pub transport: Arc<dyn CommandTransport>,
    pub operation_lock: Arc<tokio::sync::Mutex<()>>,
    /// `None` for fake/in-test workers that have no real child process.
    pub child: Option<Arc<tokio::sync::Mutex<Child>>>,
}

#[derive(Default)]
pub struct ProcessesTable {
    inner: Mutex<HashMap<PipelineId, WorkerRow>>,
}

impl ProcessesTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: WorkerRow) {
        self.inner.lock().insert(row.record.pipeline_id, row);
    }

    pub fn remove(&self, id: PipelineId) -> Option<WorkerRow> {
        self.inner.lock().remove(&id)
    }

    pub fn contains(&self, id: PipelineId) -> bool {
        self.inner.lock().contains_key(&id)
    }

    /// Snapshots every known pipeline id under the lock, then releases
    /// it — the shape every background loop iterates over.
    pub fn snapshot_ids(&self) -> Vec<PipelineId> {
        self.inner.lock().keys().copied().collect()
    }

    /// Clones the handles (transport, operation lock) needed to route a
    /// command, and whether the row is marked for removal, without
    /// holding the table lock during the command round-trip.
    pub fn routing_handles(&self, id: PipelineId) -> Option<RoutingHandles> {
        let guard = self.inner.lock();
        let row = guard.get(&id)?;
        Some(RoutingHandles {
            transport: row.transport.clone(),
            operation_lock: row.operation_lock.clone(),
            marked_for_removal: row.health.marked_for_removal,
        })
    }

    pub fn mark_for_removal(&self, id: PipelineId) {
        if let Some(row) = self.inner.lock().get_mut(&id) {
            row.health.mark_for_removal();
        }
    }

    pub fn with_health_mut<R>(&self, id: PipelineId, f: impl FnOnce(&mut PipelineHealth) -> R) -> Option<R> {
        self.inner.lock().get_mut(&id).map(|row| f(&mut row.health))
    }

    pub fn with_record_mut<R>(&self, id: PipelineId, f: impl FnOnce(&mut ManagedPipelineRecord) -> R) -> Option<R> {
        self.inner.lock().get_mut(&id).map(|row| f(&mut row.record))
    }

    pub fn child_handle(&self, id: PipelineId) -> Option<Arc<tokio::sync::Mutex<Child>>> {
        self.inner.lock().get(&id).and_then(|row| row.child.clone())
    }

    pub fn idle_non_marked_count(&self) -> usize {
        self.inner.lock().values().filter(|row| row.record.is_idle && !row.health.marked_for_removal).count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Picks an idle, non-marked pipeline to bind a new workload to, if
    /// any warm-pool member is available.
    pub fn take_idle(&self) -> Option<PipelineId> {
        let mut guard = self.inner.lock();
        let id = guard
            .values()
            .find(|row| row.record.is_idle && !row.health.marked_for_removal)
            .map(|row| row.record.pipeline_id)?;
        if let Some(row) = guard.get_mut(&id) {
            row.record.bind_workload();
        }
        Some(id)
    }
}

pub struct RoutingHandles {
    pub transport: Arc<dyn CommandTransport>,
    pub operation_lock: Arc<tokio::sync::Mutex<()>>,
    pub marked_for_removal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::transport::{FakeTransport, RetryPolicy};
    use orchestrator_domain::entities::PipelineState;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn sample_row(id: PipelineId) -> WorkerRow {
        let (cmd_tx, _cmd_rx) = mpsc::channel(1);
        let (_resp_tx, resp_rx) = mpsc::channel(1);
        let transport = Arc::new(FakeTransport::new(cmd_tx, resp_rx, RetryPolicy { max_retries: 1, total_budget: Duration::from_millis(1) }));
        WorkerRow {
            record: ManagedPipelineRecord::new(id, 1234),
            health: PipelineHealth::default(),
            transport,
            operation_lock: Arc::new(tokio::sync::Mutex::new(())),
            child: None,
        }
    }

    #[test]
    fn test_insert_and_snapshot_ids() {
        let table = ProcessesTable::new();
        let id = PipelineId::new();
        table.insert(sample_row(id));
        assert_eq!(table.snapshot_ids(), vec![id]);
    }

    #[test]
    fn test_marked_for_removal_reflected_in_routing_handles() {
        let table = ProcessesTable::new();
        let id = PipelineId::new();
        table.insert(sample_row(id));
        table.mark_for_removal(id);

        let handles = table.routing_handles(id).unwrap();
        assert!(handles.marked_for_removal);
    }

    #[test]
    fn test_take_idle_binds_workload_and_excludes_future_calls() {
        let table = ProcessesTable::new();
        let id = PipelineId::new();
        table.insert(sample_row(id));

        assert_eq!(table.take_idle(), Some(id));
        assert_eq!(table.take_idle(), None);

        table.with_record_mut(id, |r| assert_eq!(r.state, PipelineState::Running));
    }

    #[test]
    fn test_remove_drops_row_atomically_with_health() {
        let table = ProcessesTable::new();
        let id = PipelineId::new();
        table.insert(sample_row(id));
        assert!(table.remove(id).is_some());
        assert!(!table.contains(id));
        assert!(table.routing_handles(id).is_none());
    }
}
