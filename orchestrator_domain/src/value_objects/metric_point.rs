//! # Metric Point Value Object
//!
//! `(measurement, tags{pipeline_id, source_id?, level}, fields{…}, time)` —
//! the unit both `MetricSink` (per-frame, in the worker) and `Monitor`
//! (per-poll, in the orchestrator) write to the external time-series
//! store, and the unit the on-disk spool file serializes when the store
//! is unreachable.

use crate::value_objects::{PipelineId, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a point was computed per-pipeline or per-source within a
/// pipeline; carried as the `level` tag.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricLevel {
    Pipeline,
    Source,
}

/// A field value after the store-compatibility coercion rules
/// have been applied: integers and booleans pass through, floats become
/// rounded-to-2-decimal strings, `None` is dropped before it ever reaches
/// this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Bool(bool),
    String(String),
}

impl FieldValue {
    /// Converts a raw f64 field per the store-compatibility rule: rounded
    /// to two decimals and rendered as a string, not a JSON number.
    pub fn from_float(value: f64) -> Self {
        Self::String(format!("{:.2}", value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub measurement: String,
    pub pipeline_id: PipelineId,
    pub source_id: Option<SourceId>,
    pub level: MetricLevel,
    pub fields: BTreeMap<String, FieldValue>,
    pub time: DateTime<Utc>,
}

impl MetricPoint {
    pub fn pipeline_point(measurement: impl Into<String>, pipeline_id: PipelineId, time: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            pipeline_id,
            source_id: None,
            level: MetricLevel::Pipeline,
            fields: BTreeMap::new(),
            time,
        }
    }

    pub fn source_point(
        measurement: impl Into<String>,
        pipeline_id: PipelineId,
        source_id: SourceId,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            pipeline_id,
            source_id: Some(source_id),
            level: MetricLevel::Source,
            fields: BTreeMap::new(),
            time,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_field_is_rounded_string() {
        let value = FieldValue::from_float(1.23456);
        assert_eq!(value, FieldValue::String("1.23".to_string()));
    }

    #[test]
    fn test_point_roundtrips_json() {
        let point = MetricPoint::pipeline_point("inference_throughput", PipelineId::new(), Utc::now())
            .with_field("fps", FieldValue::from_float(29.97))
            .with_field("dropped", FieldValue::Int(0))
            .with_field("healthy", FieldValue::Bool(true));

        let json = serde_json::to_string(&point).unwrap();
        let back: MetricPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fields.get("fps"), Some(&FieldValue::String("29.97".to_string())));
    }
}
