//! # Command Transport
//!
//! Two implementations of `orchestrator_domain::CommandTransport`:
//!
//! - `ProcessTransport` — the real transport, writing/reading
//!   length-prefixed frames over a worker child process's stdio pipes.
//!   A background reader task forwards every response frame onto an
//!   mpsc channel; `send` drains that channel, discarding thrash
//!   responses until the matching `request_id` arrives or
//!   the retry budget is exhausted.
//! - `FakeTransport` — an in-process channel pair used by tests to
//!   exercise the command-routing algorithm without spawning a process.

use async_trait::async_trait;
use orchestrator_domain::protocol::{Command, Envelope, Outcome, Response, ResponseEnvelope};
use orchestrator_domain::value_objects::RequestId;
use orchestrator_domain::{CommandTransport, OrchestratorError};
use std::time::Duration;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{mpsc, Mutex};

/// Governs the response-read retry loop every transport implements.
/// The retry count is configurable rather than hard-coded, wired from
/// `Tunables::response_read_retries`.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub total_budget: Duration,
}

/// Drains `responses` until a frame matching `request_id` arrives,
/// silently dropping thrash (mismatched) responses, bounded by `retry`.
async fn read_matching_response(
    responses: &mut mpsc::Receiver<ResponseEnvelope>,
    request_id: RequestId,
    retry: RetryPolicy,
) -> Result<ResponseEnvelope, OrchestratorError> {
    let deadline = tokio::time::Instant::now() + retry.total_budget;
    let mut attempts = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() || attempts >= retry.max_retries {
            return Err(OrchestratorError::operation_error("timeout"));
        }
        attempts += 1;
        match tokio::time::timeout(remaining, responses.recv()).await {
            Ok(Some(envelope)) if envelope.request_id == request_id => return Ok(envelope),
            Ok(Some(thrash)) => {
                tracing::debug!(request_id = %thrash.request_id, expected = %request_id, "dropped thrash response");
                continue;
            }
            Ok(None) => return Err(OrchestratorError::operation_error("worker transport closed")),
            Err(_elapsed) => continue,
        }
    }
}

fn envelope_into_response(envelope: ResponseEnvelope) -> Result<Response, OrchestratorError> {
    match envelope.outcome {
        Outcome::Response { response } => Ok(response),
        Outcome::Error { error } => Err(match error.error_type.as_str() {
            "INVALID_PAYLOAD" => OrchestratorError::invalid_payload(error.public_error_message),
            "NOT_FOUND" => OrchestratorError::not_found(error.public_error_message),
            "AUTHORISATION_ERROR" => OrchestratorError::authorisation_error(error.public_error_message),
            "OPERATION_ERROR" => OrchestratorError::operation_error(error.public_error_message),
            _ => OrchestratorError::internal_error(error.public_error_message),
        }),
    }
}

/// The real transport: a worker child process's stdio pipes.
pub struct ProcessTransport {
    stdin: Mutex<ChildStdin>,
    responses: Mutex<mpsc::Receiver<ResponseEnvelope>>,
    retry: RetryPolicy,
}

impl ProcessTransport {
    /// Spawns the background reader task over `stdout`; `send` writes to
    /// `stdin` and reads matching replies off the forwarded channel.
    pub fn new(stdin: ChildStdin, stdout: ChildStdout, retry: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stdout = stdout;
            loop {
                match crate::wire::read_frame::<_, ResponseEnvelope>(&mut stdout).await {
                    Ok(Some(envelope)) => {
                        if tx.send(envelope).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, "worker stdout frame read failed");
                        return;
                    }
                }
            }
        });
        Self { stdin: Mutex::new(stdin), responses: Mutex::new(rx), retry }
    }
}

#[async_trait]
impl CommandTransport for ProcessTransport {
    async fn send(&self, request_id: RequestId, command: Command, timeout: Duration) -> Result<Response, OrchestratorError> {
        {
            let mut stdin = self.stdin.lock().await;
            let envelope = Envelope { request_id, command };
            tokio::time::timeout(timeout, crate::wire::write_frame(&mut *stdin, &envelope))
                .await
                .map_err(|_| OrchestratorError::operation_error("timeout writing command"))??;
        }
        let mut responses = self.responses.lock().await;
        let envelope = read_matching_response(&mut responses, request_id, self.retry).await?;
        envelope_into_response(envelope)
    }
}

/// An in-process fake transport for tests: a command channel the test
/// harness drains and a response channel it replies on, honoring the
/// exact same thrash-filtering contract as `ProcessTransport`.
pub struct FakeTransport {
    commands: mpsc::Sender<Envelope>,
    responses: Mutex<mpsc::Receiver<ResponseEnvelope>>,
    retry: RetryPolicy,
}

impl FakeTransport {
    pub fn new(commands: mpsc::Sender<Envelope>, responses: mpsc::Receiver<ResponseEnvelope>, retry: RetryPolicy) -> Self {
        Self { commands, responses: Mutex::new(responses), retry }
    }
}

#[async_trait]
impl CommandTransport for FakeTransport {
    async fn send(&self, request_id: RequestId, command: Command, timeout: Duration) -> Result<Response, OrchestratorError> {
        tokio::time::timeout(timeout, self.commands.send(Envelope { request_id, command }))
            .await
            .map_err(|_| OrchestratorError::operation_error("timeout writing command"))?
            .map_err(|_| OrchestratorError::operation_error("worker queue closed"))?;

        let mut responses = self.responses.lock().await;
        let envelope = read_matching_response(&mut responses, request_id, self.retry).await?;
        envelope_into_response(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::value_objects::PipelineId;

    #[tokio::test]
    async fn test_fake_transport_discards_thrash_response() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (resp_tx, resp_rx) = mpsc::channel(8);
        let transport = FakeTransport::new(cmd_tx, resp_rx, RetryPolicy { max_retries: 5, total_budget: Duration::from_secs(2) });

        let stale_request = RequestId::new();

        tokio::spawn(async move {
            let envelope = cmd_rx.recv().await.unwrap();
            resp_tx
                .send(ResponseEnvelope::success(stale_request, None, Response::Ack { success: true }))
                .await
                .unwrap();
            resp_tx
                .send(ResponseEnvelope::success(envelope.request_id, None, Response::Ack { success: true }))
                .await
                .unwrap();
        });

        let expected_request = RequestId::new();
        let result = transport.send(expected_request, Command::ListPipelines, Duration::from_secs(1)).await.unwrap();
        assert!(matches!(result, Response::Ack { success: true }));
    }

    #[tokio::test]
    async fn test_fake_transport_times_out_on_silent_worker() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let (_resp_tx, resp_rx) = mpsc::channel::<ResponseEnvelope>(8);
        let transport = FakeTransport::new(cmd_tx, resp_rx, RetryPolicy { max_retries: 2, total_budget: Duration::from_millis(100) });

        let result = transport
            .send(RequestId::new(), Command::Status { pipeline_id: PipelineId::new() }, Duration::from_millis(100))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fake_transport_propagates_structured_error() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let (resp_tx, resp_rx) = mpsc::channel(8);
        let transport = FakeTransport::new(cmd_tx, resp_rx, RetryPolicy { max_retries: 3, total_budget: Duration::from_secs(1) });

        tokio::spawn(async move {
            let envelope = cmd_rx.recv().await.unwrap();
            resp_tx
                .send(ResponseEnvelope::failure(
                    envelope.request_id,
                    None,
                    orchestrator_domain::protocol::ErrorBody {
                        error_type: "NOT_FOUND".to_string(),
                        public_error_message: "unknown pipeline".to_string(),
                    },
                ))
                .await
                .unwrap();
        });

        let result = transport
            .send(RequestId::new(), Command::Status { pipeline_id: PipelineId::new() }, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(OrchestratorError::NotFound(_))));
    }
}
