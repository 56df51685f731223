//! # Worker Spawning
//!
//! Spawns a fresh worker as a child of the same binary, invoked with the
//! hidden `__worker` argument `main.rs` intercepts before handing control
//! to the clap-parsed CLI surface — multi-process at the pipeline
//! boundary, one OS process per pipeline. Wires a `ProcessTransport`
//! from the child's stdio pipes and registers a fresh, idle
//! `ManagedPipelineRecord`/`PipelineHealth` row.

use crate::config::OrchestratorConfig;
use crate::supervisor::table::WorkerRow;
use crate::supervisor::transport::{ProcessTransport, RetryPolicy};
use orchestrator_domain::entities::{ManagedPipelineRecord, PipelineHealth};
use orchestrator_domain::value_objects::PipelineId;
use orchestrator_domain::OrchestratorError;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command as TokioCommand;

/// The internal subcommand a worker process is launched with. Checked by
/// `main.rs` against raw `std::env::args()` before `clap::Parser::parse`
/// runs, so it never appears in the bootstrap crate's four-command CLI
/// surface.
pub const WORKER_SUBCOMMAND: &str = "__worker";

pub async fn spawn_worker(config: &OrchestratorConfig) -> Result<WorkerRow, OrchestratorError> {
    let exe = std::env::current_exe().map_err(|e| OrchestratorError::internal_error(format!("current_exe: {e}")))?;

    let mut child = TokioCommand::new(exe)
        .arg(WORKER_SUBCOMMAND)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| OrchestratorError::internal_error(format!("spawn worker: {e}")))?;

    let pid = child.id().ok_or_else(|| OrchestratorError::internal_error("worker exited before its pid was available"))?;
    let stdin = child.stdin.take().ok_or_else(|| OrchestratorError::internal_error("worker stdin not piped"))?;
    let stdout = child.stdout.take().ok_or_else(|| OrchestratorError::internal_error("worker stdout not piped"))?;

    let retry = RetryPolicy { max_retries: config.tunables.response_read_retries, total_budget: config.tunables.queue_timeout() };
    let transport = Arc::new(ProcessTransport::new(stdin, stdout, retry));

    tracing::info!(pid, "spawned worker process");

    Ok(WorkerRow {
        record: ManagedPipelineRecord::new(PipelineId::new(), pid),
        health: PipelineHealth::default(),
        transport,
        operation_lock: Arc::new(tokio::sync::Mutex::new(())),
        child: Some(Arc::new(tokio::sync::Mutex::new(child))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_subcommand_is_not_a_plausible_user_argument() {
        assert!(WORKER_SUBCOMMAND.starts_with("__"));
    }
}
