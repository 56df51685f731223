//! # Managed Pipeline Record
//!
//! The pure bookkeeping half of `ManagedPipeline`: pipeline id, worker
//! OS pid, lifecycle state, and warm-pool membership. The command/
//! response queues, the per-pipeline operation lock, and the child
//! process handle are infrastructure concerns (`tokio::process::Child`,
//! `crossbeam_channel`, `tokio::sync::Mutex`) owned by
//! `pipeline-orchestrator::infrastructure::supervisor`; this record is
//! what the Supervisor's table stores and snapshots under its coarse
//! lock before releasing it to act on the snapshot.

use crate::entities::PipelineState;
use crate::value_objects::PipelineId;

#[derive(Debug, Clone)]
pub struct ManagedPipelineRecord {
    pub pipeline_id: PipelineId,
    pub worker_pid: u32,
    pub state: PipelineState,
    /// True for warm-pool members not yet bound to a workload.
    pub is_idle: bool,
}

impl ManagedPipelineRecord {
    pub fn new(pipeline_id: PipelineId, worker_pid: u32) -> Self {
        Self { pipeline_id, worker_pid, state: PipelineState::Initialising, is_idle: true }
    }

    /// Binds an idle warm-pool worker to an incoming `INIT` workload.
    pub fn bind_workload(&mut self) {
        self.is_idle = false;
        self.state = PipelineState::Running;
    }

    pub fn transition_to(&mut self, to: PipelineState) -> Result<(), String> {
        let next = crate::entities::pipeline_state::transition(self.state, to)?;
        self.state = next;
        Ok(())
    }
}
