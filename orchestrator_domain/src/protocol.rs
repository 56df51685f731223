//! # Wire Protocol Schema
//!
//! The length-prefixed Supervisor ↔ client protocol: a `HEADER_SIZE`-byte
//! big-endian frame length followed by a UTF-8 JSON body. This module
//! defines the body shapes only; framing and socket I/O are an
//! infrastructure concern (`pipeline-orchestrator::infrastructure::wire`).
//!
//! Keeping the schema in the domain crate lets a future out-of-process
//! test harness, or a second transport, depend on exactly this shape
//! without pulling in tokio.

use crate::value_objects::{PipelineId, RequestId, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of bytes in the big-endian length prefix of every frame.
pub const HEADER_SIZE: usize = 4;

/// Every command the wire protocol accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "INIT")]
    Init {
        /// Set by the Supervisor when forwarding to the bound worker, so
        /// the worker's own sink output paths agree with the id the
        /// Supervisor tracks it under (`<cache_root>/pipelines/<id>`).
        /// Always absent on the client-facing wire frame, since the
        /// client doesn't have an id yet when it sends `INIT`.
        #[serde(default)]
        pipeline_id: Option<PipelineId>,
        descriptor: PipelineDescriptor,
    },

    #[serde(rename = "LIST_PIPELINES")]
    ListPipelines,

    #[serde(rename = "STATUS")]
    Status { pipeline_id: PipelineId },

    #[serde(rename = "MUTE")]
    Mute { pipeline_id: PipelineId },

    #[serde(rename = "RESUME")]
    Resume { pipeline_id: PipelineId },

    #[serde(rename = "TERMINATE")]
    Terminate { pipeline_id: PipelineId },

    #[serde(rename = "CONSUME_RESULT")]
    ConsumeResult {
        pipeline_id: PipelineId,
        #[serde(default)]
        excluded_fields: Vec<String>,
    },

    #[serde(rename = "OFFER")]
    Offer {
        pipeline_id: PipelineId,
        sdp_offer: String,
        #[serde(default)]
        turn_config: Option<TurnConfig>,
        #[serde(default)]
        stream_output: Option<String>,
    },
}

impl Command {
    /// The `pipeline_id` a command targets, if any — `INIT` and
    /// `LIST_PIPELINES` target none (`INIT` doesn't have one yet;
    /// `LIST_PIPELINES` targets every pipeline). Used to echo
    /// `pipeline_id` on the response envelope.
    pub fn pipeline_id(&self) -> Option<PipelineId> {
        match self {
            Command::Init { .. } | Command::ListPipelines => None,
            Command::Status { pipeline_id }
            | Command::Mute { pipeline_id }
            | Command::Resume { pipeline_id }
            | Command::Terminate { pipeline_id }
            | Command::ConsumeResult { pipeline_id, .. }
            | Command::Offer { pipeline_id, .. } => Some(*pipeline_id),
        }
    }
}

/// A full frame sent from client to Supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub command: Command,
}

/// A full frame sent from Supervisor to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: RequestId,
    pub pipeline_id: Option<PipelineId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Response { response: Response },
    Error { error: ErrorBody },
}

impl ResponseEnvelope {
    pub fn success(request_id: RequestId, pipeline_id: Option<PipelineId>, response: Response) -> Self {
        Self { request_id, pipeline_id, outcome: Outcome::Response { response } }
    }

    pub fn failure(request_id: RequestId, pipeline_id: Option<PipelineId>, error: ErrorBody) -> Self {
        Self { request_id, pipeline_id, outcome: Outcome::Error { error } }
    }
}

/// Successful command outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Init { pipeline_id: PipelineId, success: bool },
    List { pipeline_ids: Vec<PipelineId> },
    Status { report: StatusReport },
    Ack { success: bool },
    ConsumeResult { outputs: Vec<serde_json::Value>, frames_metadata: Vec<FrameMetadata> },
    Offer { sdp_answer: String },
}

/// Wire-visible error body; `error_type` is `OrchestratorError::category()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error_type: String,
    pub public_error_message: String,
}

/// WebRTC TURN server configuration, passed through verbatim to the
/// peer connection's ICE server list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// `STATUS` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub latency_reports: Vec<serde_json::Value>,
    pub sources_metadata: Vec<SourceMetadata>,
    pub inference_throughput: f64,
}

/// Per-source liveness state carried in a `STATUS` report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source_id: SourceId,
    pub state: SourceState,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceState {
    Running,
    Ended,
    Error,
}

impl SourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Error)
    }
}

/// Per-frame metadata returned by `CONSUME_RESULT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub source_id: SourceId,
    pub frame_id: u64,
    pub frame_timestamp_ms: i64,
}

/// The `INIT` command's payload: video references, workflow spec, and
/// per-sink configuration. Everything here is opaque JSON except the
/// fields the core needs to reason about (sink toggles, queue sizes) —
/// the workflow/model specifics are out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub video_reference: Vec<String>,
    pub workflow_spec: serde_json::Value,
    pub buffer_sink: BufferSinkConfig,
    #[serde(default)]
    pub video_record_sink: Option<VideoSinkConfig>,
    #[serde(default)]
    pub video_metrics_sink: Option<MetricSinkConfig>,
    #[serde(default)]
    pub extra_params: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferSinkConfig {
    pub queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSinkConfig {
    pub is_open: bool,
    pub output_dir: String,
    #[serde(default)]
    pub target_resolution: Option<(u32, u32)>,
    #[serde(default)]
    pub video_field_name: Option<String>,
    #[serde(default)]
    pub preferred_codec: Option<String>,
    /// Overrides the measured/fallback frame rate used for the segment
    /// optimization pass and the stats overlay when present and positive.
    #[serde(default)]
    pub configured_fps: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSinkConfig {
    pub is_open: bool,
    #[serde(default)]
    pub field_selectors: Vec<String>,
}
