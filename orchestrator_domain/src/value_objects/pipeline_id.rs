//! # Pipeline Identifier Value Object
//!
//! `PipelineId` is the server-assigned opaque UUID identifying a managed
//! pipeline across its whole lifetime: it keys `ProcessesTable`,
//! `PipelineHealth`, and every wire envelope that targets a specific
//! pipeline. It is generated once by the Supervisor on `INIT` and never
//! chosen by the client.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Type-safe wrapper around the pipeline's UUID so it can never be
/// confused with a `RequestId` or `SourceId` at a call site.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(Uuid);

impl PipelineId {
    /// Generates a new, server-assigned pipeline id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a pipeline id from its string form (wire input, CLI args).
    pub fn parse(s: &str) -> Result<Self, OrchestratorError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| OrchestratorError::invalid_payload(format!("invalid pipeline_id: {e}")))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PipelineId {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for PipelineId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<PipelineId> for Uuid {
    fn from(id: PipelineId) -> Self {
        id.0
    }
}
