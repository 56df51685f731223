//! # Common Integration Test Helpers
//!
//! Builds `WorkerRow`s backed by `FakeTransport` so the Supervisor's
//! command routing, health checking, and the Monitor's poll loop can be
//! exercised end to end without spawning a real worker process.

use orchestrator_domain::entities::{ManagedPipelineRecord, PipelineHealth};
use orchestrator_domain::protocol::{Command, Envelope, Response, ResponseEnvelope};
use orchestrator_domain::value_objects::PipelineId;
use pipeline_orchestrator::supervisor::table::WorkerRow;
use pipeline_orchestrator::supervisor::transport::{FakeTransport, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const FAST_RETRY: RetryPolicy = RetryPolicy { max_retries: 3, total_budget: Duration::from_millis(200) };

/// Builds an idle `WorkerRow` whose transport hands every command to the
/// returned receiver for a test-driven responder to answer.
pub fn fake_worker(id: PipelineId, retry: RetryPolicy) -> (WorkerRow, mpsc::Receiver<Envelope>, mpsc::Sender<ResponseEnvelope>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (resp_tx, resp_rx) = mpsc::channel(64);
    let transport = Arc::new(FakeTransport::new(cmd_tx, resp_rx, retry));
    let row = WorkerRow {
        record: ManagedPipelineRecord::new(id, 999),
        health: PipelineHealth::default(),
        transport,
        operation_lock: Arc::new(tokio::sync::Mutex::new(())),
        child: None,
    };
    (row, cmd_rx, resp_tx)
}

/// Spawns a background task that answers every `Status` command it
/// receives with `report`, until the command channel closes — the
/// shape a worker's real command loop takes for a pipeline under
/// steady-state polling.
pub fn spawn_status_responder(
    mut cmd_rx: mpsc::Receiver<Envelope>,
    resp_tx: mpsc::Sender<ResponseEnvelope>,
    report: orchestrator_domain::protocol::StatusReport,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = cmd_rx.recv().await {
            let response = match envelope.command {
                Command::Status { .. } => Response::Status { report: report.clone() },
                Command::Init { pipeline_id, .. } => {
                    Response::Init { pipeline_id: pipeline_id.unwrap_or_else(PipelineId::new), success: true }
                }
                _ => Response::Ack { success: true },
            };
            if resp_tx.send(ResponseEnvelope::success(envelope.request_id, None, response)).await.is_err() {
                return;
            }
        }
    })
}
