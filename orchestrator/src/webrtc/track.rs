//! # Track Timing and Slow-Workflow Reporting
//!
//! `FrameTimer` derives a per-frame duration from `webcam_fps` (falling
//! back to 30) and hands out a monotonically increasing frame index for
//! `pts`. `SlowWorkflowTracker` counts consecutive
//! merger timeouts and flags when the track should overlay a
//! degraded-stream indicator, resetting once pulls are on time again.

use orchestrator_domain::value_objects::FrameImage;
use std::time::Duration;

pub struct FrameTimer {
    frame_duration: Duration,
    frame_count: u64,
}

impl FrameTimer {
    pub fn new(webcam_fps: Option<f64>) -> Self {
        let fps = webcam_fps.filter(|f| *f > 0.0).unwrap_or(30.0);
        Self { frame_duration: Duration::from_secs_f64(1.0 / fps), frame_count: 0 }
    }

    /// Returns this frame's `(pts, duration)`. `pts` is a simple frame
    /// index — the sample duration carries the actual timing, so a
    /// monotonic counter is sufficient for `time_base` derivation.
    pub fn next(&mut self) -> (u64, Duration) {
        let pts = self.frame_count;
        self.frame_count += 1;
        (pts, self.frame_duration)
    }
}

pub struct SlowWorkflowTracker {
    max_consecutive_timeouts: u32,
    min_consecutive_on_time: u32,
    consecutive_timeouts: u32,
    consecutive_on_time: u32,
    flagged: bool,
}

impl SlowWorkflowTracker {
    pub fn new(max_consecutive_timeouts: u32, min_consecutive_on_time: u32) -> Self {
        Self {
            max_consecutive_timeouts,
            min_consecutive_on_time,
            consecutive_timeouts: 0,
            consecutive_on_time: 0,
            flagged: false,
        }
    }

    /// Records a merger-queue pull timeout; returns true if the
    /// "workflow too slow" overlay should now be shown.
    pub fn record_timeout(&mut self) -> bool {
        self.consecutive_timeouts += 1;
        self.consecutive_on_time = 0;
        if self.consecutive_timeouts >= self.max_consecutive_timeouts {
            self.flagged = true;
        }
        self.flagged
    }

    /// Records a successful pull; returns true if the overlay should now
    /// be cleared.
    pub fn record_success(&mut self) -> bool {
        self.consecutive_timeouts = 0;
        self.consecutive_on_time += 1;
        if self.flagged && self.consecutive_on_time >= self.min_consecutive_on_time {
            self.flagged = false;
        }
        self.flagged
    }

    pub fn is_flagged(&self) -> bool {
        self.flagged
    }
}

/// Overlays a degraded-stream indicator on the last good frame: a red
/// stripe across the top rows. No text-rendering crate is in the
/// dependency stack, so the indicator is a solid color band rather than
/// rendered text; it still gives a viewer an unambiguous visual signal.
pub fn overlay_too_slow(frame: &FrameImage) -> FrameImage {
    let mut data = frame.data.to_vec();
    let stripe_height = (frame.height / 12).max(1).min(frame.height);
    let row_bytes = frame.width as usize * 3;

    for row in 0..stripe_height as usize {
        let start = row * row_bytes;
        let end = start + row_bytes;
        if end > data.len() {
            break;
        }
        for pixel in data[start..end].chunks_exact_mut(3) {
            pixel[0] = 220;
            pixel[1] = 30;
            pixel[2] = 30;
        }
    }
    FrameImage::new(frame.width, frame.height, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timer_defaults_to_30fps() {
        let mut timer = FrameTimer::new(None);
        let (pts0, duration) = timer.next();
        assert_eq!(pts0, 0);
        assert!((duration.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
        let (pts1, _) = timer.next();
        assert_eq!(pts1, 1);
    }

    #[test]
    fn test_frame_timer_uses_configured_fps() {
        let mut timer = FrameTimer::new(Some(10.0));
        let (_, duration) = timer.next();
        assert!((duration.as_secs_f64() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_slow_workflow_flags_after_threshold_and_clears_after_recovery() {
        let mut tracker = SlowWorkflowTracker::new(3, 2);
        assert!(!tracker.record_timeout());
        assert!(!tracker.record_timeout());
        assert!(tracker.record_timeout());
        assert!(tracker.is_flagged());

        assert!(tracker.record_success());
        assert!(tracker.record_success());
        assert!(!tracker.is_flagged());
    }

    #[test]
    fn test_overlay_too_slow_reddens_top_stripe() {
        let frame = FrameImage::new(4, 12, vec![0u8; 4 * 12 * 3]);
        let overlaid = overlay_too_slow(&frame);
        assert_eq!(&overlaid.data[0..3], &[220, 30, 30]);
    }
}
