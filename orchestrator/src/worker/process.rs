//! # Worker Process Main Loop
//!
//! Runs inside the child process `spawn_worker` launches: reads
//! one length-prefixed `Envelope` at a time off stdin, dispatches it
//! through `WorkerDispatcher`, and writes the matching `ResponseEnvelope`
//! to stdout. Every dispatch failure is caught at this boundary and
//! turned into a structured error response — error-kind tag plus the
//! public message — rather than unwinding the process. Exits cleanly
//! after a
//! successful `TERMINATE`, or on a clean EOF from a Supervisor that has
//! gone away.

use crate::config::OrchestratorConfig;
use crate::worker::dispatcher::WorkerDispatcher;
use orchestrator_domain::protocol::{Envelope, ErrorBody, ResponseEnvelope};
use std::sync::Arc;

/// Runs the worker's command loop to completion. `stdin`/`stdout` are
/// the process's real stdio handles, wired by `main.rs` before calling
/// in; a dedicated pair keeps this function testable against in-memory
/// buffers.
pub async fn run<R, W>(config: Arc<OrchestratorConfig>, mut stdin: R, mut stdout: W)
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let dispatcher = WorkerDispatcher::new(config);

    loop {
        let envelope: Envelope = match crate::wire::read_frame(&mut stdin).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                tracing::info!("supervisor closed the command pipe, worker exiting");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "worker failed to read command frame, exiting");
                return;
            }
        };

        let request_id = envelope.request_id;
        let pipeline_id = envelope.command.pipeline_id();
        let response = match dispatcher.dispatch(envelope.command).await {
            Ok(response) => ResponseEnvelope::success(request_id, pipeline_id, response),
            Err(e) => ResponseEnvelope::failure(
                request_id,
                pipeline_id,
                ErrorBody { error_type: e.error_type().to_string(), public_error_message: e.public_error_message() },
            ),
        };

        if let Err(e) = crate::wire::write_frame(&mut stdout, &response).await {
            tracing::error!(error = %e, "worker failed to write response frame, exiting");
            return;
        }

        if dispatcher.should_exit() {
            tracing::info!("worker terminated, exiting process loop");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::protocol::{BufferSinkConfig, Command, PipelineDescriptor};
    use orchestrator_domain::value_objects::{PipelineId, RequestId};

    fn sample_descriptor() -> PipelineDescriptor {
        PipelineDescriptor {
            video_reference: vec!["fixtures/a.mp4".to_string()],
            workflow_spec: serde_json::json!({}),
            buffer_sink: BufferSinkConfig { queue_size: 16 },
            video_record_sink: None,
            video_metrics_sink: None,
            extra_params: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_process_loop_answers_init_then_exits_on_eof() {
        let pipeline_id = PipelineId::new();
        let request = Envelope {
            request_id: RequestId::new(),
            command: Command::Init { pipeline_id: Some(pipeline_id), descriptor: sample_descriptor() },
        };

        let mut input = Vec::new();
        crate::wire::write_frame(&mut input, &request).await.unwrap();

        let mut output = Vec::new();
        run(Arc::new(OrchestratorConfig::default()), std::io::Cursor::new(input), &mut output).await;

        let mut cursor = std::io::Cursor::new(output);
        let response: ResponseEnvelope = crate::wire::read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(response.pipeline_id, Some(pipeline_id));
    }

    #[tokio::test]
    async fn test_process_loop_exits_after_terminate() {
        let pipeline_id = PipelineId::new();
        let init = Envelope {
            request_id: RequestId::new(),
            command: Command::Init { pipeline_id: Some(pipeline_id), descriptor: sample_descriptor() },
        };
        let terminate = Envelope { request_id: RequestId::new(), command: Command::Terminate { pipeline_id } };

        let mut input = Vec::new();
        crate::wire::write_frame(&mut input, &init).await.unwrap();
        crate::wire::write_frame(&mut input, &terminate).await.unwrap();
        // A third frame the loop must never reach, since it should exit
        // right after the terminate response.
        crate::wire::write_frame(&mut input, &Envelope { request_id: RequestId::new(), command: Command::ListPipelines }).await.unwrap();

        let mut output = Vec::new();
        run(Arc::new(OrchestratorConfig::default()), std::io::Cursor::new(input), &mut output).await;

        let mut cursor = std::io::Cursor::new(output);
        let _init_response: ResponseEnvelope = crate::wire::read_frame(&mut cursor).await.unwrap().unwrap();
        let terminate_response: ResponseEnvelope = crate::wire::read_frame(&mut cursor).await.unwrap().unwrap();
        assert!(matches!(terminate_response.outcome, orchestrator_domain::protocol::Outcome::Response { .. }));
        let nothing: Option<ResponseEnvelope> = crate::wire::read_frame(&mut cursor).await.unwrap();
        assert!(nothing.is_none());
    }
}
