//! # Command Routing
//!
//! The algorithm every non-`INIT`/`LIST` command follows:
//!
//! 1. Look up `pipeline_id`; `NOT_FOUND` if absent.
//! 2. `OPERATION_ERROR` if marked for removal.
//! 3. Acquire the per-pipeline operation lock within `QUEUE_TIMEOUT`.
//! 4. Forward the command over the transport (which itself enforces the
//!    queue-put timeout and the thrash-filtering response read).
//! 5. Release the lock unconditionally.

use crate::supervisor::table::ProcessesTable;
use orchestrator_domain::protocol::{Command, Response};
use orchestrator_domain::value_objects::{PipelineId, RequestId};
use orchestrator_domain::{CommandTransport, OrchestratorError};
use std::time::Duration;

/// Routes one command to the worker for `pipeline_id`, enforcing lock
/// acquisition timeout and the marked-for-removal guard. The transport
/// itself is responsible for the command-queue-put timeout and the
/// thrash-filtered response read.
pub async fn route_command(
    table: &ProcessesTable,
    pipeline_id: PipelineId,
    request_id: RequestId,
    command: Command,
    queue_timeout: Duration,
) -> Result<Response, OrchestratorError> {
    let handles = table
        .routing_handles(pipeline_id)
        .ok_or_else(|| OrchestratorError::not_found(format!("unknown pipeline {pipeline_id}")))?;

    if handles.marked_for_removal {
        return Err(OrchestratorError::operation_error("terminating"));
    }

    let guard = match tokio::time::timeout(queue_timeout, handles.operation_lock.lock()).await {
        Ok(guard) => guard,
        Err(_) => return Err(OrchestratorError::operation_error("busy")),
    };

    // The lock guard's drop at the end of this function's scope is the
    // "release unconditionally" step — every return path below runs it.
    let result = handles.transport.send(request_id, command, queue_timeout).await;
    drop(guard);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::table::WorkerRow;
    use crate::supervisor::transport::{FakeTransport, RetryPolicy};
    use orchestrator_domain::entities::{ManagedPipelineRecord, PipelineHealth};
    use orchestrator_domain::protocol::{Outcome, ResponseEnvelope};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn install_fake_worker(
        table: &ProcessesTable,
        id: PipelineId,
        respond: impl Fn(RequestId) -> ResponseEnvelope + Send + 'static,
    ) {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (resp_tx, resp_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some(envelope) = cmd_rx.recv().await {
                let _ = resp_tx.send(respond(envelope.request_id)).await;
            }
        });
        let transport = Arc::new(FakeTransport::new(cmd_tx, resp_rx, RetryPolicy { max_retries: 3, total_budget: Duration::from_secs(1) }));
        table.insert(WorkerRow {
            record: ManagedPipelineRecord::new(id, 1),
            health: PipelineHealth::default(),
            transport,
            operation_lock: Arc::new(tokio::sync::Mutex::new(())),
            child: None,
        });
    }

    #[tokio::test]
    async fn test_unknown_pipeline_returns_not_found() {
        let table = ProcessesTable::new();
        let result = route_command(
            &table,
            PipelineId::new(),
            RequestId::new(),
            Command::ListPipelines,
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(OrchestratorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_marked_for_removal_returns_operation_error() {
        let table = ProcessesTable::new();
        let id = PipelineId::new();
        install_fake_worker(&table, id, |rid| ResponseEnvelope::success(rid, None, Response::Ack { success: true }));
        table.mark_for_removal(id);

        let result = route_command(&table, id, RequestId::new(), Command::Mute { pipeline_id: id }, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(OrchestratorError::OperationError(_))));
    }

    #[tokio::test]
    async fn test_successful_round_trip_returns_response() {
        let table = ProcessesTable::new();
        let id = PipelineId::new();
        install_fake_worker(&table, id, |rid| ResponseEnvelope::success(rid, None, Response::Ack { success: true }));

        let result = route_command(&table, id, RequestId::new(), Command::Mute { pipeline_id: id }, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(result, Response::Ack { success: true }));
    }

    #[tokio::test]
    async fn test_lock_contention_returns_busy() {
        let table = ProcessesTable::new();
        let id = PipelineId::new();
        install_fake_worker(&table, id, |rid| ResponseEnvelope::success(rid, None, Response::Ack { success: true }));

        let handles = table.routing_handles(id).unwrap();
        let _held = handles.operation_lock.lock().await;

        let result = route_command(&table, id, RequestId::new(), Command::Mute { pipeline_id: id }, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(OrchestratorError::OperationError(_))));
        let _ = Outcome::Response { response: Response::Ack { success: true } };
    }
}
