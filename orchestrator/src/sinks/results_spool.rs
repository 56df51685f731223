//! # Results Spool
//!
//! An opt-in mirror of successful `CONSUME_RESULT` replies to
//! `<cache_root>/pipelines/<pipeline_id>/results/batch_<millis>.json`,
//! gated by `results_spool.enabled` (default off). Independent of the
//! Monitor's metrics spool (`monitor::spool`): this one runs inside the
//! worker, on the `CONSUME_RESULT` request path, not the orchestrator's
//! polling loop.

use orchestrator_domain::protocol::FrameMetadata;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
struct SpooledResult {
    source_id: String,
    frame_id: u64,
    frame_timestamp: i64,
    output_data: serde_json::Value,
}

pub fn results_dir(cache_root: &Path, pipeline_id: orchestrator_domain::value_objects::PipelineId) -> PathBuf {
    cache_root.join("pipelines").join(pipeline_id.to_string()).join("results")
}

/// Writes one batch file if `outputs`/`frames_metadata` are non-empty,
/// returning its path. A no-op on an empty result set, matching the
/// original's "no frames, no file" behavior.
pub fn write_batch(
    cache_root: &Path,
    pipeline_id: orchestrator_domain::value_objects::PipelineId,
    outputs: &[serde_json::Value],
    frames_metadata: &[FrameMetadata],
) -> std::io::Result<Option<PathBuf>> {
    if outputs.is_empty() || frames_metadata.is_empty() {
        return Ok(None);
    }

    let dir = results_dir(cache_root, pipeline_id);
    fs::create_dir_all(&dir)?;

    let records: Vec<SpooledResult> = frames_metadata
        .iter()
        .zip(outputs.iter())
        .map(|(metadata, output)| SpooledResult {
            source_id: metadata.source_id.to_string(),
            frame_id: metadata.frame_id,
            frame_timestamp: metadata.frame_timestamp_ms,
            output_data: output.clone(),
        })
        .collect();

    let millis = chrono::Utc::now().timestamp_millis();
    let path = dir.join(format!("batch_{millis}.json"));
    let body = serde_json::to_vec_pretty(&records)?;
    fs::write(&path, body)?;
    Ok(Some(path))
}
