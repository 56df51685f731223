//! # Domain Ports
//!
//! Narrow adapter traits that replace the original deployment's
//! monkey-patched extension points: `Sink`, the
//! composite `MultiSink`, `FrameProducer`, `InferenceSession`, and
//! `CommandTransport`. Concrete implementations (bounded queues,
//! gstreamer encoders, process I/O) live in `pipeline-orchestrator`;
//! this crate only defines the seam.

use crate::error::OrchestratorError;
use crate::value_objects::FrameEnvelope;
use async_trait::async_trait;

/// The bounded-queue sink contract every sink chain member obeys.
///
/// `on_prediction` is called from the pipeline driver's thread and must
/// not block; implementations own a single internal worker thread, a
/// bounded FIFO, and a drop policy. This trait models only the
/// call-and-forget boundary — the queue/thread machinery is an
/// infrastructure concern.
pub trait Sink: Send + Sync {
    /// Enqueues a frame for this sink's worker thread. Never blocks;
    /// implementations apply their configured drop policy on a full queue.
    fn on_prediction(&self, frame: FrameEnvelope);

    /// Writes a sentinel, joins the worker thread with a timeout, and
    /// flushes remaining items best-effort.
    fn close(&self);

    /// Human-readable name for logging (`"buffer"`, `"video"`, `"metric"`).
    fn name(&self) -> &'static str;
}

/// Fan-out composite: forwards every call to each attached sink in
/// attachment order. A panic or error inside one sink must never prevent
/// the others from receiving the frame — callers are expected to wrap
/// fallible sinks so `on_prediction` itself cannot propagate an error.
pub struct MultiSink {
    sinks: Vec<Box<dyn Sink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn attach(&mut self, sink: Box<dyn Sink>) -> &mut Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

impl Default for MultiSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for MultiSink {
    fn on_prediction(&self, frame: FrameEnvelope) {
        for sink in &self.sinks {
            sink.on_prediction(frame.clone());
        }
    }

    fn close(&self) {
        for sink in &self.sinks {
            sink.close();
        }
    }

    fn name(&self) -> &'static str {
        "multi"
    }
}

/// A blocking `Grab → Retrieve` frame producer — the worker's view of
/// the frame-source driver, which is out of scope. The pipeline
/// driver polls this once per iteration of its single-threaded
/// cooperative loop.
#[async_trait]
pub trait FrameProducer: Send + Sync {
    async fn next_frame(&mut self) -> Result<Option<FrameEnvelope>, OrchestratorError>;
}

/// "A function from frame to prediction" — the worker's view of the ML
/// model runtime, which is out of scope.
#[async_trait]
pub trait InferenceSession: Send + Sync {
    async fn infer(&self, frame: &FrameEnvelope) -> Result<FrameEnvelope, OrchestratorError>;
}

/// The Supervisor's view of a worker process: put a command, await the
/// matching response. Implementations own the actual
/// `command_queue`/`responses_queue` process-safe channels; this trait
/// is what the command-routing algorithm is written against, so
/// it can be exercised with an in-process fake in tests.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send(
        &self,
        request_id: crate::value_objects::RequestId,
        command: crate::protocol::Command,
        timeout: std::time::Duration,
    ) -> Result<crate::protocol::Response, OrchestratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{FrameImage, SourceId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        name: &'static str,
        count: Arc<AtomicUsize>,
    }

    impl Sink for CountingSink {
        fn on_prediction(&self, _frame: FrameEnvelope) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&self) {}

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn sample_frame() -> FrameEnvelope {
        FrameEnvelope {
            source_id: SourceId::new("camera-0"),
            frame_id: 1,
            frame_timestamp_ms: 0,
            image: FrameImage::new(2, 2, vec![0u8; 12]),
            prediction: std::collections::HashMap::new(),
        }
    }

    #[test]
    fn test_multi_sink_fans_out_to_every_attached_sink() {
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));

        let mut multi = MultiSink::new();
        multi.attach(Box::new(CountingSink { name: "a", count: count_a.clone() }));
        multi.attach(Box::new(CountingSink { name: "b", count: count_b.clone() }));

        multi.on_prediction(sample_frame());

        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
        assert_eq!(multi.sink_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_multi_sink_does_not_panic() {
        let multi = MultiSink::new();
        multi.on_prediction(sample_frame());
        multi.close();
    }
}
