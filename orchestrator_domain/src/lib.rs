//! # Orchestrator Domain
//!
//! Pure types for the inference-pipeline orchestrator: the wire protocol
//! schema, the five-kind error taxonomy, the pipeline lifecycle entities,
//! and the narrow adapter traits (`Sink`, `FrameProducer`,
//! `InferenceSession`, `CommandTransport`) the rest of the workspace is
//! written against.
//!
//! This crate has no tokio, no process or socket I/O, and no concurrency
//! primitives — everything here is reasoned about and tested
//! synchronously. `pipeline-orchestrator` supplies the concrete
//! concurrent/async machinery behind these seams.

pub mod entities;
pub mod error;
pub mod ports;
pub mod protocol;
pub mod value_objects;

pub use entities::{ManagedPipelineRecord, PipelineHealth, PipelineState};
pub use error::OrchestratorError;
pub use ports::{CommandTransport, FrameProducer, InferenceSession, MultiSink, Sink};
pub use value_objects::{
    FieldValue, FrameEnvelope, FrameImage, MetricLevel, MetricPoint, PipelineId, PredictionValue, RequestId,
    SegmentFile, SourceId,
};
