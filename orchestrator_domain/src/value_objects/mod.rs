//! # Value Objects
//!
//! Immutable, validated data the domain reasons about: identifiers
//! (`PipelineId`, `RequestId`, `SourceId`), the unit that flows through
//! the sink chain (`FrameEnvelope`), the recorded-segment bookkeeping
//! type (`SegmentFile`), and the time-series unit (`MetricPoint`).

pub mod frame_envelope;
pub mod metric_point;
pub mod pipeline_id;
pub mod request_id;
pub mod segment_file;
pub mod source_id;

pub use frame_envelope::{FrameEnvelope, FrameImage, PredictionValue};
pub use metric_point::{FieldValue, MetricLevel, MetricPoint};
pub use pipeline_id::PipelineId;
pub use request_id::RequestId;
pub use segment_file::{sort_oldest_first, SegmentFile};
pub use source_id::SourceId;
