//! # MetricSink
//!
//! Builds one `MetricPoint` per `on_prediction` call from the configured
//! field selectors — dotted paths resolved through the prediction
//! mapping, plus a computed `duration` field (now minus the
//! frame's capture timestamp, in nanoseconds). Batches to the external
//! time-series store, flushing on size or interval, and degrades to a
//! disabled no-op when the store handle is absent. Floats are written as
//! rounded strings, not true floats, matching the external store's
//! compatibility expectation.

use crate::sinks::counters::SinkCounters;
use crate::store::TimeSeriesStore;
use orchestrator_domain::ports::Sink;
use orchestrator_domain::value_objects::{FieldValue, FrameEnvelope, MetricPoint, PipelineId, PredictionValue};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// One dotted-path selector: `"confidence"` or `"detections.0.label"`.
/// Resolved against the prediction map's top-level key plus a remainder
/// path walked through nested JSON values; `WorkflowImage` outputs are
/// never selectable (only their presence as the video field matters).
#[derive(Debug, Clone)]
pub struct FieldSelector {
    pub output_field: String,
}

impl FieldSelector {
    pub fn parse(raw: &str) -> Self {
        Self { output_field: raw.to_string() }
    }

    /// Resolves this selector against one frame's predictions, applying
    /// the store-compatibility coercion: ints/bools pass through, floats
    /// become rounded strings, missing/null values are dropped.
    fn resolve(&self, frame: &FrameEnvelope) -> Option<(String, FieldValue)> {
        let (head, rest) = match self.output_field.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (self.output_field.as_str(), None),
        };
        let value = match frame.prediction.get(head)? {
            PredictionValue::Json(json) => json,
            PredictionValue::Image(_) => return None,
        };
        let resolved = match rest {
            Some(path) => path.split('.').try_fold(value, |acc, key| acc.get(key))?,
            None => value,
        };
        let field = json_to_field_value(resolved)?;
        Some((self.output_field.clone(), field))
    }
}

fn json_to_field_value(value: &serde_json::Value) -> Option<FieldValue> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(FieldValue::Int(i))
            } else {
                n.as_f64().map(FieldValue::from_float)
            }
        }
        serde_json::Value::String(s) => Some(FieldValue::String(s.clone())),
        _ => None,
    }
}

struct MetricSinkWorker {
    store: Arc<dyn TimeSeriesStore>,
    batch: Vec<MetricPoint>,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl MetricSinkWorker {
    async fn flush(&mut self, counters: &SinkCounters) {
        if self.batch.is_empty() {
            self.last_flush = Instant::now();
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        if let Err(e) = self.store.write_points(batch).await {
            tracing::error!(error = %e, "metric sink flush failed, points dropped");
            counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.last_flush = Instant::now();
    }
}

pub struct MetricSink {
    sender: Option<mpsc::Sender<FrameEnvelope>>,
    counters: Arc<SinkCounters>,
    handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl MetricSink {
    /// The "disabled" sink: accepts every call but drops everything,
    /// used when required store configuration is absent.
    pub fn disabled() -> Arc<Self> {
        Arc::new(Self { sender: None, counters: Arc::new(SinkCounters::new()), handle: std::sync::Mutex::new(None) })
    }

    pub fn enabled(
        pipeline_id: PipelineId,
        field_selectors: Vec<String>,
        store: Arc<dyn TimeSeriesStore>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Arc<Self> {
        let selectors: Vec<FieldSelector> = field_selectors.iter().map(|s| FieldSelector::parse(s)).collect();
        let (tx, mut rx) = mpsc::channel::<FrameEnvelope>(1024);
        let counters = Arc::new(SinkCounters::new());
        let worker_counters = counters.clone();

        let handle = tokio::spawn(async move {
            let mut worker =
                MetricSinkWorker { store, batch: Vec::new(), batch_size, flush_interval, last_flush: Instant::now() };
            loop {
                let remaining = worker.flush_interval.saturating_sub(worker.last_flush.elapsed());
                tokio::select! {
                    received = rx.recv() => {
                        match received {
                            Some(frame) => {
                                let mut point = MetricPoint::source_point(
                                    "frame_metrics",
                                    pipeline_id,
                                    frame.source_id.clone(),
                                    chrono::Utc::now(),
                                );
                                let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
                                let duration_ns = now_ns.saturating_sub(frame.frame_timestamp_ms * 1_000_000);
                                point = point.with_field("duration_ns", FieldValue::Int(duration_ns));
                                for selector in &selectors {
                                    if let Some((key, value)) = selector.resolve(&frame) {
                                        point = point.with_field(key, value);
                                    }
                                }
                                worker.batch.push(point);
                                if worker.batch.len() >= worker.batch_size {
                                    worker.flush(&worker_counters).await;
                                }
                            }
                            None => {
                                worker.flush(&worker_counters).await;
                                return;
                            }
                        }
                    }
                    _ = tokio::time::sleep(remaining) => {
                        worker.flush(&worker_counters).await;
                    }
                }
            }
        });

        Arc::new(Self { sender: Some(tx), counters, handle: std::sync::Mutex::new(Some(handle)) })
    }

    pub fn counters(&self) -> Arc<SinkCounters> {
        self.counters.clone()
    }
}

impl Sink for MetricSink {
    fn on_prediction(&self, frame: FrameEnvelope) {
        let Some(sender) = &self.sender else { return };
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        if sender.try_send(frame).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn close(&self) {
        // The worker task drains and flushes its remaining batch when its
        // channel closes naturally (on `Arc` drop); `abort` here is the
        // best-effort fallback for a sink closed while still referenced
        // elsewhere.
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn name(&self) -> &'static str {
        "metric"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_selector_resolves_top_level_int() {
        let mut prediction = std::collections::HashMap::new();
        prediction.insert("count".to_string(), PredictionValue::Json(serde_json::json!(3)));
        let frame = sample_frame(prediction);

        let selector = FieldSelector::parse("count");
        let (key, value) = selector.resolve(&frame).unwrap();
        assert_eq!(key, "count");
        assert_eq!(value, FieldValue::Int(3));
    }

    #[test]
    fn test_field_selector_resolves_nested_path() {
        let mut prediction = std::collections::HashMap::new();
        prediction.insert("detections".to_string(), PredictionValue::Json(serde_json::json!({"top": {"score": 0.987}})));
        let frame = sample_frame(prediction);

        let selector = FieldSelector::parse("detections.top.score");
        let (_, value) = selector.resolve(&frame).unwrap();
        assert_eq!(value, FieldValue::String("0.99".to_string()));
    }

    #[test]
    fn test_field_selector_drops_missing_path() {
        let frame = sample_frame(std::collections::HashMap::new());
        assert!(FieldSelector::parse("missing.path").resolve(&frame).is_none());
    }

    #[test]
    fn test_disabled_sink_drops_without_blocking() {
        let sink = MetricSink::disabled();
        sink.on_prediction(sample_frame(std::collections::HashMap::new()));
        assert_eq!(sink.counters().snapshot(), (0, 0, 0));
    }

    fn sample_frame(prediction: std::collections::HashMap<String, PredictionValue>) -> FrameEnvelope {
        use orchestrator_domain::value_objects::{FrameImage, SourceId};
        FrameEnvelope {
            source_id: SourceId::new("camera-0"),
            frame_id: 1,
            frame_timestamp_ms: chrono::Utc::now().timestamp_millis(),
            image: FrameImage::new(2, 2, vec![0u8; 12]),
            prediction,
        }
    }
}
