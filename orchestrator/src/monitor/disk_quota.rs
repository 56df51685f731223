//! # Recordings Disk Quota
//!
//! The Monitor's two sweeps over `<cache_root>/pipelines/*`: a size cap
//! (delete whole pipeline subdirectories oldest-first until usage drops
//! under 80% of `max_size_gb`) and an age cap (delete any pipeline
//! subdirectory older than `max_days`, independent of the size cap).
//! Both operate one directory level below `pipelines/` — never inside a
//! single pipeline's own `records/`/`results/` split, which is
//! `VideoSink`'s rolling eviction's job instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

struct PipelineDir {
    path: PathBuf,
    size_bytes: u64,
    modified: SystemTime,
}

fn list_pipeline_dirs(cache_root: &Path) -> std::io::Result<Vec<PipelineDir>> {
    let pipelines_dir = cache_root.join("pipelines");
    if !pipelines_dir.exists() {
        return Ok(Vec::new());
    }

    let mut dirs = Vec::new();
    for entry in fs::read_dir(&pipelines_dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }
        let size_bytes = dir_size(&entry.path())?;
        let modified = most_recent_mtime(&entry.path())?.unwrap_or(metadata.modified()?);
        dirs.push(PipelineDir { path: entry.path(), size_bytes, modified });
    }
    Ok(dirs)
}

fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(total)
}

/// The most recent modification time of any file under `path`, used so
/// an actively-recording pipeline's age is judged by its newest segment
/// rather than the directory's own (possibly stale) mtime.
fn most_recent_mtime(path: &Path) -> std::io::Result<Option<SystemTime>> {
    let mut newest = None;
    for entry in walkdir::WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if entry.file_type().is_file() {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                newest = Some(match newest {
                    Some(current) if current >= modified => current,
                    _ => modified,
                });
            }
        }
    }
    Ok(newest)
}

/// Deletes whole pipeline subdirectories, oldest-first by most-recent
/// file mtime, until total usage drops under 80% of `max_bytes`.
pub fn enforce_size_cap(cache_root: &Path, max_bytes: u64) -> std::io::Result<()> {
    let mut dirs = list_pipeline_dirs(cache_root)?;
    let total: u64 = dirs.iter().map(|d| d.size_bytes).sum();
    if total <= max_bytes {
        return Ok(());
    }

    dirs.sort_by_key(|d| d.modified);
    let target = (max_bytes as f64 * 0.8) as u64;
    let mut total = total;
    for dir in dirs {
        if total <= target {
            break;
        }
        tracing::warn!(
            path = %dir.path.display(),
            size = %byte_unit::Byte::from_u64(dir.size_bytes).get_appropriate_unit(byte_unit::UnitType::Binary),
            "evicting pipeline directory over disk quota"
        );
        fs::remove_dir_all(&dir.path)?;
        total = total.saturating_sub(dir.size_bytes);
    }
    Ok(())
}

/// Deletes any pipeline subdirectory whose most-recent file is older
/// than `max_age`, independent of the size cap. Run every
/// `cleanup_interval`.
pub fn remove_older_than(cache_root: &Path, max_age: Duration) -> std::io::Result<()> {
    let now = SystemTime::now();
    for dir in list_pipeline_dirs(cache_root)? {
        let age = now.duration_since(dir.modified).unwrap_or(Duration::ZERO);
        if age > max_age {
            tracing::info!(path = %dir.path.display(), age_days = age.as_secs() / 86_400, "removing pipeline directory past max age");
            fs::remove_dir_all(&dir.path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, bytes: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = fs::File::create(path).unwrap();
        f.write_all(&vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_enforce_size_cap_removes_oldest_first() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("pipelines").join("a").join("records").join("seg.mp4");
        let b = root.path().join("pipelines").join("b").join("records").join("seg.mp4");
        write_file(&a, 1024);
        std::thread::sleep(Duration::from_millis(20));
        write_file(&b, 1024);

        enforce_size_cap(root.path(), 1024).unwrap();

        assert!(!root.path().join("pipelines").join("a").exists());
        assert!(root.path().join("pipelines").join("b").exists());
    }

    #[test]
    fn test_enforce_size_cap_noop_under_limit() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("pipelines").join("a").join("records").join("seg.mp4");
        write_file(&a, 100);

        enforce_size_cap(root.path(), 10_000).unwrap();
        assert!(root.path().join("pipelines").join("a").exists());
    }

    #[test]
    fn test_remove_older_than_deletes_stale_directory() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("pipelines").join("a").join("records").join("seg.mp4");
        write_file(&a, 10);
        std::thread::sleep(Duration::from_millis(20));

        remove_older_than(root.path(), Duration::from_millis(1)).unwrap();
        assert!(!root.path().join("pipelines").join("a").exists());
    }

    #[test]
    fn test_missing_pipelines_dir_is_not_an_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(enforce_size_cap(root.path(), 1).is_ok());
        assert!(remove_older_than(root.path(), Duration::from_secs(1)).is_ok());
    }
}
