//! # Pipeline Driver
//!
//! Runs inside a worker process, one per `INIT`. Drives every attached
//! `FrameProducer` round-robin, pushes each frame through an
//! `InferenceSession`, and forwards the result to the worker's sink
//! chain. Frame decode and the model runtime are out of
//! scope — `StubFrameProducer` and `PassthroughInferenceSession` stand
//! in for them so the rest of the worker (sink chain, status reporting,
//! mute/resume, termination) can be exercised end to end.

use orchestrator_domain::ports::{FrameProducer, InferenceSession, Sink};
use orchestrator_domain::protocol::{PipelineDescriptor, SourceMetadata, SourceState, StatusReport};
use orchestrator_domain::value_objects::{FrameEnvelope, FrameImage, SourceId};
use orchestrator_domain::OrchestratorError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A synthetic producer standing in for real decode: emits `frame_count`
/// blank frames at roughly `fps`, then reports its source ended.
pub struct StubFrameProducer {
    source_id: SourceId,
    remaining: u64,
    frame_id: u64,
    width: u32,
    height: u32,
    frame_interval: Duration,
}

impl StubFrameProducer {
    pub fn new(source_id: SourceId, frame_count: u64, fps: f64) -> Self {
        let fps = if fps > 0.0 { fps } else { 30.0 };
        Self {
            source_id,
            remaining: frame_count,
            frame_id: 0,
            width: 640,
            height: 480,
            frame_interval: Duration::from_secs_f64(1.0 / fps),
        }
    }
}

#[async_trait::async_trait]
impl FrameProducer for StubFrameProducer {
    async fn next_frame(&mut self) -> Result<Option<FrameEnvelope>, OrchestratorError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        tokio::time::sleep(self.frame_interval).await;
        self.remaining -= 1;
        self.frame_id += 1;
        let pixel_count = (self.width * self.height * 3) as usize;
        Ok(Some(FrameEnvelope {
            source_id: self.source_id.clone(),
            frame_id: self.frame_id,
            frame_timestamp_ms: chrono::Utc::now().timestamp_millis(),
            image: FrameImage::new(self.width, self.height, vec![0u8; pixel_count]),
            prediction: HashMap::new(),
        }))
    }
}

/// Stands in for "a function from frame to prediction": returns
/// the frame unchanged.
pub struct PassthroughInferenceSession;

#[async_trait::async_trait]
impl InferenceSession for PassthroughInferenceSession {
    async fn infer(&self, frame: &FrameEnvelope) -> Result<FrameEnvelope, OrchestratorError> {
        Ok(frame.clone())
    }
}

/// Builds one producer per `video_reference` entry, using the reference
/// string itself as the `SourceId`. `frame_count` bounds
/// the stub's synthetic stream so sources reach a terminal state and
/// exercise the health-check loop's all-terminal termination path.
pub fn build_producers(descriptor: &PipelineDescriptor, frame_count: u64, fps: f64) -> Vec<(SourceId, Box<dyn FrameProducer>)> {
    descriptor
        .video_reference
        .iter()
        .map(|reference| {
            let source_id = SourceId::new(reference.clone());
            let producer: Box<dyn FrameProducer> = Box::new(StubFrameProducer::new(source_id.clone(), frame_count, fps));
            (source_id, producer)
        })
        .collect()
}

struct SourceEntry {
    producer: Box<dyn FrameProducer>,
    state: SourceState,
}

/// Owns the per-pipeline run loop: polls every source, infers, forwards
/// to the sink chain, and tracks per-source state for `STATUS`.
pub struct PipelineDriver {
    muted: Arc<AtomicBool>,
    frames_processed: Arc<AtomicU64>,
    started_at: std::time::Instant,
    sources: Arc<Mutex<HashMap<SourceId, SourceState>>>,
    shutdown: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    sink: Arc<dyn Sink>,
}

impl PipelineDriver {
    /// Spawns the driver's run loop. `sink` is the already-composed
    /// `MultiSink` for this pipeline.
    pub fn spawn(
        mut producers: Vec<(SourceId, Box<dyn FrameProducer>)>,
        inference: Box<dyn InferenceSession>,
        sink: Arc<dyn Sink>,
    ) -> Arc<Self> {
        let muted = Arc::new(AtomicBool::new(false));
        let frames_processed = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();
        let sources = Arc::new(Mutex::new(
            producers.iter().map(|(id, _)| (id.clone(), SourceState::Running)).collect::<HashMap<_, _>>(),
        ));

        let mut entry_ids: Vec<SourceId> = Vec::with_capacity(producers.len());
        let mut entries: Vec<SourceEntry> = Vec::with_capacity(producers.len());
        for (id, producer) in producers.drain(..) {
            entry_ids.push(id);
            entries.push(SourceEntry { producer, state: SourceState::Running });
        }

        let loop_muted = muted.clone();
        let loop_frames = frames_processed.clone();
        let loop_sources = sources.clone();
        let loop_shutdown = shutdown.clone();
        let loop_sink = sink.clone();

        let task = tokio::spawn(async move {
            loop {
                if loop_shutdown.is_cancelled() {
                    break;
                }
                if loop_muted.load(Ordering::Relaxed) {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }

                let mut any_running = false;
                for (idx, entry) in entries.iter_mut().enumerate() {
                    let id = &entry_ids[idx];
                    if entry.state.is_terminal() {
                        continue;
                    }
                    any_running = true;

                    match entry.producer.next_frame().await {
                        Ok(Some(frame)) => {
                            match inference.infer(&frame).await {
                                Ok(processed) => {
                                    loop_sink.on_prediction(processed);
                                    loop_frames.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => {
                                    tracing::warn!(source = %id, error = %e, "inference failed for frame");
                                }
                            }
                        }
                        Ok(None) => {
                            entry.state = SourceState::Ended;
                            loop_sources.lock().insert(id.clone(), SourceState::Ended);
                            tracing::info!(source = %id, "source ended");
                        }
                        Err(e) => {
                            entry.state = SourceState::Error;
                            loop_sources.lock().insert(id.clone(), SourceState::Error);
                            tracing::warn!(source = %id, error = %e, "source producer errored");
                        }
                    }
                }

                if !any_running {
                    break;
                }
            }
        });

        Arc::new(Self { muted, frames_processed, started_at: std::time::Instant::now(), sources, shutdown, task: Mutex::new(Some(task)), sink })
    }

    pub fn mute(&self) {
        self.muted.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.muted.store(false, Ordering::Relaxed);
    }

    pub fn status_report(&self) -> StatusReport {
        let elapsed = self.started_at.elapsed().as_secs_f64().max(f64::EPSILON);
        let frames = self.frames_processed.load(Ordering::Relaxed) as f64;
        let sources_metadata = self
            .sources
            .lock()
            .iter()
            .map(|(id, state)| SourceMetadata { source_id: id.clone(), state: *state })
            .collect();
        StatusReport { latency_reports: Vec::new(), sources_metadata, inference_throughput: frames / elapsed }
    }

    /// Signals the run loop to stop, joins it, then closes the sink
    /// chain so its own worker threads flush and exit on TERMINATE.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.sink.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::ports::MultiSink;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink {
        count: Arc<AtomicUsize>,
    }

    impl Sink for CountingSink {
        fn on_prediction(&self, _frame: FrameEnvelope) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
        fn close(&self) {}
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_driver_processes_frames_then_reports_ended() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut multi = MultiSink::new();
        multi.attach(Box::new(CountingSink { count: count.clone() }));
        let sink: Arc<dyn Sink> = Arc::new(multi);

        let producers: Vec<(SourceId, Box<dyn FrameProducer>)> =
            vec![(SourceId::new("camera-0"), Box::new(StubFrameProducer::new(SourceId::new("camera-0"), 3, 1000.0)))];
        let driver = PipelineDriver::spawn(producers, Box::new(PassthroughInferenceSession), sink);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let report = driver.status_report();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(report.sources_metadata.iter().all(|s| s.state.is_terminal()));

        driver.stop().await;
    }

    #[tokio::test]
    async fn test_mute_pauses_frame_processing() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut multi = MultiSink::new();
        multi.attach(Box::new(CountingSink { count: count.clone() }));
        let sink: Arc<dyn Sink> = Arc::new(multi);

        let producers: Vec<(SourceId, Box<dyn FrameProducer>)> =
            vec![(SourceId::new("camera-0"), Box::new(StubFrameProducer::new(SourceId::new("camera-0"), 100, 1000.0)))];
        let driver = PipelineDriver::spawn(producers, Box::new(PassthroughInferenceSession), sink);
        driver.mute();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        driver.resume();
        driver.stop().await;
    }
}
