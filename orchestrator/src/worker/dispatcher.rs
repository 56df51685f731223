//! # Worker Command Dispatcher
//!
//! Builds the sink chain on `INIT`, then handles every
//! other command against the running `PipelineDriver`: `STATUS` reads
//! its report, `MUTE`/`RESUME` toggle it, `TERMINATE` stops it and signals
//! the worker process to exit, `CONSUME_RESULT` drains the
//! `BufferSink`'s results ring, and `OFFER` stands up a `WebrtcBridge`.
//! Every failure is mapped into a structured `OrchestratorError` rather
//! than unwinding — the process loop wraps each into a response frame.

use crate::config::{OrchestratorConfig, Tunables};
use crate::sinks::{results_spool, BufferSink, MetricSink, SinkCounters, VideoSink};
use crate::sinks::video_sink::VideoSinkConfig;
use crate::store::{HttpTimeSeriesStore, NullTimeSeriesStore, TimeSeriesStore};
use crate::webrtc::WebrtcBridge;
use crate::worker::pipeline::{build_producers, PassthroughInferenceSession, PipelineDriver};
use orchestrator_domain::ports::{MultiSink, Sink};
use orchestrator_domain::protocol::{Command, FrameMetadata, PipelineDescriptor, Response, StatusReport};
use orchestrator_domain::value_objects::PipelineId;
use orchestrator_domain::OrchestratorError;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Synthetic stub stream length (decode is out of scope): long
/// enough to exercise STATUS/CONSUME_RESULT/termination without running
/// forever.
const STUB_FRAME_COUNT: u64 = 36_000;
const STUB_FPS: f64 = 30.0;

struct RunningPipeline {
    pipeline_id: PipelineId,
    driver: Arc<PipelineDriver>,
    buffer_sink: Arc<BufferSink>,
    bridge: Option<Arc<WebrtcBridge>>,
}

pub struct WorkerDispatcher {
    config: Arc<OrchestratorConfig>,
    running: Mutex<Option<RunningPipeline>>,
    should_exit: std::sync::atomic::AtomicBool,
}

impl WorkerDispatcher {
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self { config, running: Mutex::new(None), should_exit: std::sync::atomic::AtomicBool::new(false) }
    }

    /// Set after a successful `TERMINATE`; the worker's process loop
    /// checks this after replying and exits.
    pub fn should_exit(&self) -> bool {
        self.should_exit.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub async fn dispatch(&self, command: Command) -> Result<Response, OrchestratorError> {
        match command {
            Command::Init { pipeline_id, descriptor } => self.handle_init(pipeline_id, descriptor).await,
            Command::ListPipelines => Err(OrchestratorError::invalid_payload("LIST_PIPELINES is not a worker command")),
            Command::Status { .. } => self.handle_status().await,
            Command::Mute { .. } => self.handle_mute().await,
            Command::Resume { .. } => self.handle_resume().await,
            Command::Terminate { .. } => self.handle_terminate().await,
            Command::ConsumeResult { excluded_fields, .. } => self.handle_consume_result(excluded_fields).await,
            Command::Offer { sdp_offer, turn_config, stream_output, .. } => {
                self.handle_offer(sdp_offer, turn_config, stream_output).await
            }
        }
    }

    async fn handle_init(&self, pipeline_id: Option<PipelineId>, descriptor: PipelineDescriptor) -> Result<Response, OrchestratorError> {
        let pipeline_id = pipeline_id.unwrap_or_else(PipelineId::new);
        let tunables = &self.config.tunables;

        let buffer_sink = BufferSink::new(descriptor.buffer_sink.queue_size);
        let mut multi = MultiSink::new();
        multi.attach(Box::new(ClonedSink(buffer_sink.clone())));

        if let Some(video_config) = descriptor.video_record_sink.as_ref().filter(|c| c.is_open) {
            let config = VideoSinkConfig::from_wire(std::path::Path::new(&self.config.cache_root), pipeline_id, video_config, tunables);
            let video_sink = VideoSink::new(config).map_err(|e| OrchestratorError::internal_error(format!("starting video sink: {e}")))?;
            multi.attach(Box::new(ClonedSinkArc(video_sink)));
        }

        if let Some(metric_config) = descriptor.video_metrics_sink.as_ref().filter(|c| c.is_open) {
            let store = self.build_time_series_store()?;
            let metric_sink = MetricSink::enabled(
                pipeline_id,
                metric_config.field_selectors.clone(),
                store,
                tunables.metric_batch_size,
                tunables.metric_flush_interval(),
            );
            multi.attach(Box::new(ClonedSinkArc(metric_sink)));
        }

        let sink: Arc<dyn Sink> = Arc::new(multi);
        let producers = build_producers(&descriptor, STUB_FRAME_COUNT, STUB_FPS);
        let driver = PipelineDriver::spawn(producers, Box::new(PassthroughInferenceSession), sink);

        *self.running.lock().await = Some(RunningPipeline { pipeline_id, driver, buffer_sink, bridge: None });
        Ok(Response::Init { pipeline_id, success: true })
    }

    fn build_time_series_store(&self) -> Result<Arc<dyn TimeSeriesStore>, OrchestratorError> {
        match self.config.services.get("time_series_endpoint").and_then(|v| v.as_str()) {
            Some(endpoint) => {
                Ok(Arc::new(HttpTimeSeriesStore::new(endpoint.to_string(), self.config.tunables.queue_timeout())?))
            }
            None => Ok(Arc::new(NullTimeSeriesStore)),
        }
    }

    async fn handle_status(&self) -> Result<Response, OrchestratorError> {
        let guard = self.running.lock().await;
        let running = guard.as_ref().ok_or_else(|| OrchestratorError::not_found("pipeline not initialised"))?;
        Ok(Response::Status { report: running.driver.status_report() })
    }

    async fn handle_mute(&self) -> Result<Response, OrchestratorError> {
        let guard = self.running.lock().await;
        let running = guard.as_ref().ok_or_else(|| OrchestratorError::not_found("pipeline not initialised"))?;
        running.driver.mute();
        Ok(Response::Ack { success: true })
    }

    async fn handle_resume(&self) -> Result<Response, OrchestratorError> {
        let guard = self.running.lock().await;
        let running = guard.as_ref().ok_or_else(|| OrchestratorError::not_found("pipeline not initialised"))?;
        running.driver.resume();
        Ok(Response::Ack { success: true })
    }

    async fn handle_terminate(&self) -> Result<Response, OrchestratorError> {
        let running = self.running.lock().await.take();
        let Some(running) = running else {
            return Err(OrchestratorError::not_found("pipeline not initialised"));
        };
        if let Some(bridge) = &running.bridge {
            bridge.stop();
        }
        running.driver.stop().await;
        self.should_exit.store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(Response::Ack { success: true })
    }

    async fn handle_consume_result(&self, excluded_fields: Vec<String>) -> Result<Response, OrchestratorError> {
        let guard = self.running.lock().await;
        let running = guard.as_ref().ok_or_else(|| OrchestratorError::not_found("pipeline not initialised"))?;

        let frames = running.buffer_sink.consume_results();
        let mut outputs = Vec::with_capacity(frames.len());
        let mut frames_metadata = Vec::with_capacity(frames.len());
        for frame in &frames {
            let mut prediction = serde_json::Map::new();
            for (key, value) in &frame.prediction {
                if excluded_fields.contains(key) {
                    continue;
                }
                if let orchestrator_domain::value_objects::PredictionValue::Json(json) = value {
                    prediction.insert(key.clone(), json.clone());
                }
            }
            outputs.push(serde_json::Value::Object(prediction));
            frames_metadata.push(FrameMetadata {
                source_id: frame.source_id.clone(),
                frame_id: frame.frame_id,
                frame_timestamp_ms: frame.frame_timestamp_ms,
            });
        }

        if self.config.results_spool.enabled {
            let cache_root = std::path::Path::new(&self.config.cache_root);
            if let Err(e) = results_spool::write_batch(cache_root, running.pipeline_id, &outputs, &frames_metadata) {
                tracing::warn!(pipeline_id = %running.pipeline_id, error = %e, "results spool write failed");
            }
        }

        Ok(Response::ConsumeResult { outputs, frames_metadata })
    }

    async fn handle_offer(
        &self,
        sdp_offer: String,
        turn_config: Option<orchestrator_domain::protocol::TurnConfig>,
        stream_output: Option<String>,
    ) -> Result<Response, OrchestratorError> {
        let mut guard = self.running.lock().await;
        let running = guard.as_mut().ok_or_else(|| OrchestratorError::not_found("pipeline not initialised"))?;

        let (bridge, answer) =
            WebrtcBridge::create(sdp_offer, turn_config, stream_output, running.buffer_sink.clone(), &self.config.tunables).await?;
        if let Some(old) = running.bridge.replace(bridge) {
            old.stop();
        }
        Ok(Response::Offer { sdp_answer: answer })
    }
}

/// Adapts `Arc<BufferSink>` to `Sink` for attachment into a `MultiSink`
/// without giving the `MultiSink` box ownership of the `Arc` itself —
/// the dispatcher keeps its own `Arc<BufferSink>` to drain results from.
struct ClonedSink(Arc<BufferSink>);

impl Sink for ClonedSink {
    fn on_prediction(&self, frame: orchestrator_domain::value_objects::FrameEnvelope) {
        self.0.on_prediction(frame)
    }
    fn close(&self) {
        self.0.close()
    }
    fn name(&self) -> &'static str {
        self.0.name()
    }
}

/// Same adapter for any other `Arc<dyn Sink>`-shaped concrete sink type
/// (`VideoSink`, `MetricSink`) that also needs to stay independently
/// reachable (for counters) after attachment.
struct ClonedSinkArc<T: Sink + 'static>(Arc<T>);

impl<T: Sink + 'static> Sink for ClonedSinkArc<T> {
    fn on_prediction(&self, frame: orchestrator_domain::value_objects::FrameEnvelope) {
        self.0.on_prediction(frame)
    }
    fn close(&self) {
        self.0.close()
    }
    fn name(&self) -> &'static str {
        self.0.name()
    }
}

#[allow(dead_code)]
fn unused_counters_reference(counters: Arc<SinkCounters>) -> Arc<SinkCounters> {
    counters
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::protocol::BufferSinkConfig;

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
    async fn test_status_before_init_is_not_found() {
        let dispatcher = WorkerDispatcher::new(Arc::new(OrchestratorConfig::default()));
        let result = dispatcher.dispatch(Command::Status { pipeline_id: PipelineId::new() }).await;
        assert!(matches!(result, Err(OrchestratorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_init_then_status_reports_running_source() {
        let dispatcher = WorkerDispatcher::new(Arc::new(OrchestratorConfig::default()));
        let init = dispatcher.dispatch(Command::Init { pipeline_id: Some(PipelineId::new()), descriptor: sample_descriptor() }).await.unwrap();
        assert!(matches!(init, Response::Init { success: true, .. }));

        let status = dispatcher.dispatch(Command::Status { pipeline_id: PipelineId::new() }).await.unwrap();
        let Response::Status { report } = status else { panic!("expected status response") };
        assert_eq!(report.sources_metadata.len(), 1);
    }

    #[tokio::test]
    async fn test_terminate_then_status_is_not_found() {
        let dispatcher = WorkerDispatcher::new(Arc::new(OrchestratorConfig::default()));
        dispatcher.dispatch(Command::Init { pipeline_id: Some(PipelineId::new()), descriptor: sample_descriptor() }).await.unwrap();

        let terminate = dispatcher.dispatch(Command::Terminate { pipeline_id: PipelineId::new() }).await.unwrap();
        assert!(matches!(terminate, Response::Ack { success: true }));
        assert!(dispatcher.should_exit());

        let status = dispatcher.dispatch(Command::Status { pipeline_id: PipelineId::new() }).await;
        assert!(matches!(status, Err(OrchestratorError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_consume_result_drains_produced_frames() {
        let dispatcher = WorkerDispatcher::new(Arc::new(OrchestratorConfig::default()));
        dispatcher.dispatch(Command::Init { pipeline_id: Some(PipelineId::new()), descriptor: sample_descriptor() }).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        let consumed = dispatcher.dispatch(Command::ConsumeResult { pipeline_id: PipelineId::new(), excluded_fields: vec![] }).await.unwrap();
        let Response::ConsumeResult { frames_metadata, .. } = consumed else { panic!("expected consume-result response") };
        assert!(!frames_metadata.is_empty());
    }

    #[tokio::test]
    async fn test_consume_result_spools_batch_file_when_enabled() {
        let cache_root = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.cache_root = cache_root.path().to_string_lossy().to_string();
        config.results_spool.enabled = true;
        let dispatcher = WorkerDispatcher::new(Arc::new(config));

        let init = dispatcher.dispatch(Command::Init { pipeline_id: None, descriptor: sample_descriptor() }).await.unwrap();
        let Response::Init { pipeline_id, .. } = init else { panic!("expected init response") };

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        dispatcher.dispatch(Command::ConsumeResult { pipeline_id, excluded_fields: vec![] }).await.unwrap();

        let results_dir = crate::sinks::results_spool::results_dir(cache_root.path(), pipeline_id);
        let entries: Vec<_> = std::fs::read_dir(&results_dir).unwrap().collect();
        assert!(!entries.is_empty());
    }
}
