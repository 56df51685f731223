//! # Sink Chain
//!
//! Concrete `Sink` implementations attached to every worker's pipeline:
//! `BufferSink` (two independent in-memory rings), `VideoSink`
//! (segmented recorder with background post-encode optimization and
//! rolling disk-quota eviction), and `MetricSink` (batched time-series
//! writer with a disabled no-op mode). `counters` holds the shared
//! enqueued/dropped/errors bookkeeping every sink logs every 30s.

pub mod buffer_sink;
pub mod counters;
pub mod metric_sink;
pub mod results_spool;
pub mod video_sink;

pub use buffer_sink::BufferSink;
pub use counters::SinkCounters;
pub use metric_sink::MetricSink;
pub use video_sink::VideoSink;
