//! # Source Identifier Value Object
//!
//! Identifies one video source within a (possibly multi-source) pipeline.
//! Unlike `PipelineId`/`RequestId` this is a plain string: source
//! identifiers come from the pipeline descriptor's video-reference list
//! and are meaningful to the caller (e.g. a camera name), not generated
//! by the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let id = SourceId::new("camera-0");
        assert_eq!(id.to_string(), "camera-0");
        assert_eq!(id.as_str(), "camera-0");
    }
}
