//! # Segment File Value Object
//!
//! One recorded video segment produced by `VideoSink`. Segments are
//! ordered by `created_time` and form the FIFO eviction list the rolling
//! disk-quota sweep consumes.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::PathBuf;

/// Filename format segments are named with: `YYYYmmddHHMMSS.mp4`.
pub const SEGMENT_FILENAME_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_time: DateTime<Utc>,
    pub frame_count: u64,
}

impl SegmentFile {
    /// Builds the canonical segment filename for a given creation time.
    pub fn filename_for(created_time: DateTime<Utc>) -> String {
        format!("{}.mp4", created_time.format(SEGMENT_FILENAME_FORMAT))
    }

    /// Parses `created_time` from a segment's filename, per the
    /// `YYYYmmddHHMMSS.mp4` convention. Returns `None` for names that
    /// don't match — callers fall back to file ctime.
    pub fn parse_created_time_from_filename(filename: &str) -> Option<DateTime<Utc>> {
        let stem = filename.strip_suffix(".mp4")?;
        let naive = NaiveDateTime::parse_from_str(stem, SEGMENT_FILENAME_FORMAT).ok()?;
        Some(DateTime::from_naive_utc_and_offset(naive, Utc))
    }
}

/// Orders a mutable segment list oldest-first, the order the rolling
/// eviction sweep and the Monitor's disk-quota cleanup both require.
pub fn sort_oldest_first(segments: &mut [SegmentFile]) {
    segments.sort_by_key(|s| s.created_time);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filename_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let name = SegmentFile::filename_for(ts);
        assert_eq!(name, "20250314092653.mp4");

        let parsed = SegmentFile::parse_created_time_from_filename(&name).unwrap();
        assert_eq!(parsed, ts);
    }

    #[test]
    fn test_parse_rejects_malformed_filename() {
        assert!(SegmentFile::parse_created_time_from_filename("not-a-timestamp.mp4").is_none());
        assert!(SegmentFile::parse_created_time_from_filename("20250314092653.mov").is_none());
    }

    #[test]
    fn test_sort_oldest_first() {
        let older = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let mut segments = vec![
            SegmentFile { path: "b.mp4".into(), size_bytes: 10, created_time: newer, frame_count: 10 },
            SegmentFile { path: "a.mp4".into(), size_bytes: 10, created_time: older, frame_count: 10 },
        ];
        sort_oldest_first(&mut segments);
        assert_eq!(segments[0].created_time, older);
        assert_eq!(segments[1].created_time, newer);
    }
}
