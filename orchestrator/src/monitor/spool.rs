//! # Metrics Spool
//!
//! The on-disk JSON queue the Monitor writes to when the time-series
//! store is unreachable: `<output_dir>/metrics_backup/
//! metrics_backup_<ts>.json`, each file an array of
//! `{measurement, tags{}, fields{}, timestamp}`-shaped points. Written
//! with a monotonic in-process sequence number appended to the
//! timestamp so two spool writes within the same second never collide.

use orchestrator_domain::value_objects::MetricPoint;
use std::fs;
use std::path::{Path, PathBuf};

pub fn spool_dir(output_dir: &str) -> PathBuf {
    Path::new(output_dir).join("metrics_backup")
}

/// Writes one spool file, returning its path. `seq` disambiguates
/// multiple spool writes issued within the same wall-clock second.
pub fn write_spool_file(output_dir: &str, seq: u64, points: &[MetricPoint]) -> std::io::Result<PathBuf> {
    let dir = spool_dir(output_dir);
    fs::create_dir_all(&dir)?;

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("metrics_backup_{timestamp}_{seq}.json"));

    let body = serde_json::to_vec_pretty(points)?;
    fs::write(&path, body)?;
    Ok(path)
}

/// Lists spool files in timestamp order (lexicographic on the filename,
/// which sorts chronologically given the zero-padded format), the order
/// `Monitor::replay_backlog` must process them in.
pub fn list_spool_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn read_spool_file(path: &Path) -> std::io::Result<Vec<MetricPoint>> {
    let body = fs::read(path)?;
    let points = serde_json::from_slice(&body)?;
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::value_objects::PipelineId;

    #[test]
    fn test_write_then_read_spool_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().to_str().unwrap();
        let points = vec![MetricPoint::pipeline_point("m", PipelineId::new(), chrono::Utc::now())];

        let path = write_spool_file(output_dir, 0, &points).unwrap();
        let back = read_spool_file(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].measurement, "m");
    }

    #[test]
    fn test_list_spool_files_sorts_chronologically() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().to_str().unwrap();
        let points = vec![MetricPoint::pipeline_point("m", PipelineId::new(), chrono::Utc::now())];

        write_spool_file(output_dir, 0, &points).unwrap();
        write_spool_file(output_dir, 1, &points).unwrap();
        write_spool_file(output_dir, 2, &points).unwrap();

        let files = list_spool_files(&spool_dir(output_dir)).unwrap();
        assert_eq!(files.len(), 3);
        let names: Vec<String> = files.iter().map(|p| p.file_name().unwrap().to_string_lossy().to_string()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_list_spool_files_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(list_spool_files(&missing).unwrap().is_empty());
    }
}
