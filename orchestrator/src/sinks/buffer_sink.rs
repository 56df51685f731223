//! # BufferSink
//!
//! A ring buffer of `FrameEnvelope`s of size `queue_size`, overwriting
//! the oldest entry when full. One `Sink` owns *two* independent rings:
//! the `results` ring drained by `CONSUME_RESULT`, and the
//! `webrtc` ring drained by the frame merger. A slow consumer on one ring
//! never affects the other — there is no shared index or lock between
//! them, only the `on_prediction` call that writes into both.

use crate::sinks::counters::SinkCounters;
use orchestrator_domain::ports::Sink;
use orchestrator_domain::value_objects::FrameEnvelope;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

struct Ring {
    items: Mutex<VecDeque<FrameEnvelope>>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self { items: Mutex::new(VecDeque::with_capacity(capacity.max(1))), capacity: capacity.max(1) }
    }

    /// Appends `frame`, evicting the oldest entry if full. Returns true
    /// if an entry was dropped to make room.
    fn push(&self, frame: FrameEnvelope) -> bool {
        let mut items = self.items.lock();
        let dropped = items.len() >= self.capacity;
        if dropped {
            items.pop_front();
        }
        items.push_back(frame);
        dropped
    }

    fn drain_up_to(&self, max: usize) -> Vec<FrameEnvelope> {
        let mut items = self.items.lock();
        let take = max.min(items.len());
        items.drain(..take).collect()
    }

    fn try_pop(&self) -> Option<FrameEnvelope> {
        self.items.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

pub struct BufferSink {
    results: Ring,
    webrtc: Ring,
    counters: Arc<SinkCounters>,
}

impl BufferSink {
    pub fn new(queue_size: usize) -> Arc<Self> {
        Arc::new(Self { results: Ring::new(queue_size), webrtc: Ring::new(queue_size), counters: Arc::new(SinkCounters::new()) })
    }

    pub fn counters(&self) -> Arc<SinkCounters> {
        self.counters.clone()
    }

    /// Drains every frame currently buffered on the results ring — the
    /// payload `CONSUME_RESULT` turns into `outputs`/`frames_metadata`.
    pub fn consume_results(&self) -> Vec<FrameEnvelope> {
        self.results.drain_up_to(self.results.len())
    }

    /// Non-blocking pop from the WebRTC ring; the frame-merger coroutine
    /// calls this once per tick per attached source.
    pub fn try_recv_webrtc(&self) -> Option<FrameEnvelope> {
        self.webrtc.try_pop()
    }
}

impl Sink for BufferSink {
    fn on_prediction(&self, frame: FrameEnvelope) {
        self.counters.enqueued.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if self.results.push(frame.clone()) {
            self.counters.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        self.webrtc.push(frame);
    }

    fn close(&self) {}

    fn name(&self) -> &'static str {
        "buffer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::value_objects::{FrameImage, SourceId};
    use std::collections::HashMap;

    fn sample_frame(frame_id: u64) -> FrameEnvelope {
        FrameEnvelope {
            source_id: SourceId::new("camera-0"),
            frame_id,
            frame_timestamp_ms: 0,
            image: FrameImage::new(2, 2, vec![0u8; 12]),
            prediction: HashMap::new(),
        }
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let sink = BufferSink::new(2);
        sink.on_prediction(sample_frame(1));
        sink.on_prediction(sample_frame(2));
        sink.on_prediction(sample_frame(3));

        let results = sink.consume_results();
        assert_eq!(results.iter().map(|f| f.frame_id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_rings_are_independent() {
        let sink = BufferSink::new(4);
        sink.on_prediction(sample_frame(1));
        sink.on_prediction(sample_frame(2));

        assert_eq!(sink.try_recv_webrtc().unwrap().frame_id, 1);
        // The results ring is untouched by draining the webrtc ring.
        assert_eq!(sink.consume_results().len(), 2);
    }

    #[test]
    fn test_consume_results_drains_everything_buffered() {
        let sink = BufferSink::new(8);
        for id in 1..=5 {
            sink.on_prediction(sample_frame(id));
        }
        assert_eq!(sink.consume_results().len(), 5);
        assert!(sink.consume_results().is_empty());
    }
}
