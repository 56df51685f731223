//! # VideoSink — segmented recorder
//!
//! Writes `<output_dir>/YYYYmmddHHMMSS.mp4` segments, rolling over every
//! `segment_duration`. A single writer thread owns the current
//! segment; `on_prediction` only enqueues onto a bounded channel so the
//! pipeline driver's thread is never blocked. Closing a segment hands it
//! to a detached background task that shells out to `ffmpeg` (if present
//! on `PATH`) for the post-encode `faststart`/4:2:0 pass — failure or a
//! missing binary simply leaves the segment as originally written, which
//! is the "restore the original file" edge case.
//!
//! Segment bodies are this sink's own length-prefixed container of
//! JPEG-encoded frames (via the `image` crate) plus a small per-frame
//! timestamp header — a deliberate scoping choice, since a full H.264
//! muxer is outside what this crate vendors; see `DESIGN.md`. Every
//! written frame is resized to `target_resolution` (aspect-preserving,
//! dimensions forced even) when configured, and carries a pixel-level
//! stats overlay (an FPS meter bar plus a per-frame tick mark) burned
//! into the frame before encoding — not just sidecar metadata. The
//! frame rate used for the overlay and for `ffmpeg`'s `-r` on the
//! optimize pass follows config → measured (rolling 1s window) →
//! 10fps fallback for a segment with no measurement yet.

use crate::config::Tunables;
use crate::sinks::counters::SinkCounters;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
use orchestrator_domain::ports::Sink;
use orchestrator_domain::protocol::VideoSinkConfig as WireVideoSinkConfig;
use orchestrator_domain::value_objects::{sort_oldest_first, FrameEnvelope, SegmentFile};
use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_FALLBACK_FPS: f64 = 10.0;
const FPS_WINDOW_MS: i64 = 1_000;

pub struct VideoSinkConfig {
    pub output_dir: PathBuf,
    pub target_resolution: Option<(u32, u32)>,
    pub video_field_name: Option<String>,
    pub segment_duration: Duration,
    pub max_total_size_bytes: u64,
    pub max_disk_usage_ratio: f64,
    pub configured_fps: Option<f64>,
}

impl VideoSinkConfig {
    pub fn from_wire(cache_root: &Path, pipeline_id: orchestrator_domain::value_objects::PipelineId, wire: &WireVideoSinkConfig, tunables: &Tunables) -> Self {
        Self {
            output_dir: cache_root.join("pipelines").join(pipeline_id.to_string()).join(&wire.output_dir),
            target_resolution: wire.target_resolution,
            video_field_name: wire.video_field_name.clone(),
            segment_duration: tunables.video_segment_duration(),
            max_total_size_bytes: tunables.video_max_total_size_bytes,
            max_disk_usage_ratio: tunables.video_max_disk_usage_ratio,
            configured_fps: wire.configured_fps,
        }
    }
}

struct WriterState {
    segments: VecDeque<SegmentFile>,
    current_path: Option<PathBuf>,
    current_file: Option<fs::File>,
    segment_started_at: Option<Instant>,
    frames_since_check: u32,
    frame_count_current: u64,
    /// Frame capture timestamps within the trailing `FPS_WINDOW_MS`,
    /// oldest first, used to derive the measured frame rate.
    recent_timestamps_ms: VecDeque<i64>,
    /// The last frame rate this sink actually measured, carried across
    /// segment boundaries so a freshly opened segment isn't forced to
    /// the fallback before it has its own two frames.
    last_measured_fps: Option<f64>,
}

pub struct VideoSink {
    sender: crossbeam_channel::Sender<FrameEnvelope>,
    handle: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
    counters: Arc<SinkCounters>,
    stop: Arc<AtomicBool>,
}

impl VideoSink {
    /// Must be called from inside a tokio runtime — the writer thread
    /// needs a `Handle` to spawn the detached optimization task.
    pub fn new(config: VideoSinkConfig) -> std::io::Result<Arc<Self>> {
        fs::create_dir_all(&config.output_dir)?;
        let segments = preload_segments(&config.output_dir)?;
        let (tx, rx) = crossbeam_channel::bounded::<FrameEnvelope>(256);
        let counters = Arc::new(SinkCounters::new());
        let stop = Arc::new(AtomicBool::new(false));
        let rt_handle = tokio::runtime::Handle::current();

        let thread_counters = counters.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::Builder::new()
            .name("video-sink-writer".to_string())
            .spawn(move || {
                let mut state = WriterState {
                    segments,
                    current_path: None,
                    current_file: None,
                    segment_started_at: None,
                    frames_since_check: 0,
                    frame_count_current: 0,
                    recent_timestamps_ms: VecDeque::new(),
                    last_measured_fps: None,
                };
                while let Ok(frame) = rx.recv() {
                    if thread_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Err(e) = write_one_frame(&config, &mut state, &frame, &rt_handle) {
                        tracing::warn!(error = %e, "video sink write failed");
                        thread_counters.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                close_current_segment(&config, &mut state, &rt_handle);
            })
            .expect("spawn video sink writer thread");

        Ok(Arc::new(Self { sender: tx, handle: std::sync::Mutex::new(Some(handle)), counters, stop }))
    }

    pub fn counters(&self) -> Arc<SinkCounters> {
        self.counters.clone()
    }
}

impl Sink for VideoSink {
    fn on_prediction(&self, frame: FrameEnvelope) {
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        if self.sender.try_send(frame).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn close(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn name(&self) -> &'static str {
        "video"
    }
}

fn write_one_frame(config: &VideoSinkConfig, state: &mut WriterState, frame: &FrameEnvelope, rt: &tokio::runtime::Handle) -> std::io::Result<()> {
    let now = Instant::now();
    let need_new_segment = match state.segment_started_at {
        None => true,
        Some(started) => now.duration_since(started) >= config.segment_duration,
    };
    if need_new_segment {
        close_current_segment(config, state, rt);
        open_new_segment(config, state)?;
    }

    push_timestamp(&mut state.recent_timestamps_ms, frame.frame_timestamp_ms);
    if let Some(measured) = measured_fps(&state.recent_timestamps_ms) {
        state.last_measured_fps = Some(measured);
    }
    let fps = effective_fps(config, state);

    let visual = frame.select_visual(config.video_field_name.as_deref());
    let encoded = encode_frame_with_stats(visual, frame.frame_timestamp_ms, fps, config.target_resolution);
    if let Some(file) = state.current_file.as_mut() {
        file.write_all(&(encoded.len() as u32).to_be_bytes())?;
        file.write_all(&encoded)?;
        file.flush()?;
    }
    state.frame_count_current += 1;
    state.frames_since_check += 1;

    if let (Some(path), Some(seg)) = (&state.current_path, state.segments.back_mut()) {
        if &seg.path == path {
            seg.frame_count = state.frame_count_current;
            seg.size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(seg.size_bytes);
        }
    }

    if state.frames_since_check >= 100 {
        state.frames_since_check = 0;
        enforce_rolling_eviction(config, state)?;
    }
    Ok(())
}

fn open_new_segment(config: &VideoSinkConfig, state: &mut WriterState) -> std::io::Result<()> {
    let created_time = chrono::Utc::now();
    let path = config.output_dir.join(SegmentFile::filename_for(created_time));
    let file = fs::File::create(&path)?;

    state.segments.push_back(SegmentFile { path: path.clone(), size_bytes: 0, created_time, frame_count: 0 });
    state.current_path = Some(path);
    state.current_file = Some(file);
    state.segment_started_at = Some(Instant::now());
    state.frame_count_current = 0;
    Ok(())
}

/// Hands the just-closed segment to a detached optimization task and
/// clears the writer's current-segment fields. A no-op if no segment is
/// open (first call, or already closed).
fn close_current_segment(config: &VideoSinkConfig, state: &mut WriterState, rt: &tokio::runtime::Handle) {
    state.current_file = None;
    state.segment_started_at = None;
    let fps = effective_fps(config, state);
    if let Some(path) = state.current_path.take() {
        rt.spawn(async move {
            optimize_segment(&path, fps).await;
        });
    }
}

/// Re-encodes `path` with `ffmpeg -r <fps> -movflags +faststart -pix_fmt
/// yuv420p` if the binary is on `PATH`; on any failure the original file
/// is left untouched, which is the "restore the original" behavior.
async fn optimize_segment(path: &Path, fps: f64) {
    let tmp = path.with_extension("mp4.optimizing");
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-r", &fps.to_string(), "-i"])
        .arg(path)
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"])
        .arg(&tmp)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            if let Err(e) = tokio::fs::rename(&tmp, path).await {
                tracing::warn!(path = %path.display(), error = %e, "failed to install optimized segment, original kept");
                let _ = tokio::fs::remove_file(&tmp).await;
            }
        }
        Ok(_) => {
            tracing::debug!(path = %path.display(), "ffmpeg optimization pass failed, original segment kept");
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        Err(_) => {
            // ffmpeg not installed — segment stands as originally written.
        }
    }
}

/// Appends `ts` to the rolling window and evicts anything older than
/// `FPS_WINDOW_MS`.
fn push_timestamp(window: &mut VecDeque<i64>, ts: i64) {
    window.push_back(ts);
    while let Some(&front) = window.front() {
        if ts.saturating_sub(front) > FPS_WINDOW_MS {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// The frame rate measured from the trailing window, or `None` if fewer
/// than two samples have landed in it yet.
fn measured_fps(window: &VecDeque<i64>) -> Option<f64> {
    if window.len() < 2 {
        return None;
    }
    let span_ms = (window.back().unwrap() - window.front().unwrap()) as f64;
    if span_ms <= 0.0 {
        return None;
    }
    Some((window.len() - 1) as f64 * 1000.0 / span_ms)
}

/// config → measured (trailing window) → the fallback rate for a
/// segment that has not measured anything yet.
fn effective_fps(config: &VideoSinkConfig, state: &WriterState) -> f64 {
    if let Some(fps) = config.configured_fps.filter(|f| *f > 0.0) {
        return fps;
    }
    measured_fps(&state.recent_timestamps_ms).or(state.last_measured_fps).unwrap_or(DEFAULT_FALLBACK_FPS)
}

/// Resizes `buf` to fit inside `target` preserving aspect ratio, then
/// forces both output dimensions even (the usual 4:2:0 chroma-subsampling
/// constraint). A no-op when `target` is `None` or degenerate.
fn scale_to_target(buf: RgbImage, target: Option<(u32, u32)>) -> RgbImage {
    let Some((target_w, target_h)) = target else { return buf };
    let (src_w, src_h) = buf.dimensions();
    if target_w == 0 || target_h == 0 || src_w == 0 || src_h == 0 {
        return buf;
    }
    let scale = (target_w as f64 / src_w as f64).min(target_h as f64 / src_h as f64);
    let mut new_w = ((src_w as f64 * scale).round() as u32).max(1);
    let mut new_h = ((src_h as f64 * scale).round() as u32).max(1);
    if new_w % 2 != 0 {
        new_w += 1;
    }
    if new_h % 2 != 0 {
        new_h += 1;
    }
    if new_w == src_w && new_h == src_h {
        return buf;
    }
    image::imageops::resize(&buf, new_w, new_h, FilterType::Triangle)
}

/// Burns an FPS meter bar and a per-frame tick mark into the top-left
/// corner of `buf` — a real pixel overlay, not sidecar metadata. The bar
/// length is `fps / 60` of the available width, clamped to `[0, 1]`.
fn overlay_stats(buf: &mut RgbImage, fps: f64, frame_index: u64) {
    let (width, height) = buf.dimensions();
    if width < 4 || height < 4 {
        return;
    }
    let bar_height = (height / 40).clamp(2, 8);
    let max_bar_width = width - 4;
    let fps_ratio = (fps / 60.0).clamp(0.0, 1.0);
    let bar_width = ((max_bar_width as f64) * fps_ratio).round() as u32;

    for y in 2..(2 + bar_height).min(height) {
        for x in 2..(2 + bar_width).min(width) {
            buf.put_pixel(x, y, Rgb([0, 220, 0]));
        }
    }

    let tick_x = 2 + (frame_index % max_bar_width as u64) as u32;
    if tick_x < width {
        buf.put_pixel(tick_x, 0, Rgb([220, 0, 0]));
        buf.put_pixel(tick_x, 1, Rgb([220, 0, 0]));
    }
}

fn encode_frame_with_stats(
    image: &orchestrator_domain::value_objects::FrameImage,
    timestamp_ms: i64,
    fps: f64,
    target_resolution: Option<(u32, u32)>,
) -> Vec<u8> {
    let mut jpeg_bytes = Vec::new();
    if let Some(buf) = ImageBuffer::<Rgb<u8>, _>::from_raw(image.width, image.height, image.data.to_vec()) {
        let mut buf = scale_to_target(buf, target_resolution);
        overlay_stats(&mut buf, fps, timestamp_ms.max(0) as u64);
        let _ = buf.write_to(&mut std::io::Cursor::new(&mut jpeg_bytes), image::ImageFormat::Jpeg);
    }
    let header = serde_json::json!({"timestamp_ms": timestamp_ms, "fps": fps});
    let header_bytes = serde_json::to_vec(&header).unwrap_or_default();

    let mut out = Vec::with_capacity(4 + header_bytes.len() + jpeg_bytes.len());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&jpeg_bytes);
    out
}

/// Every 100 frames: if tracked size exceeds the cap or disk usage is
/// over the ratio threshold, delete oldest segments until under 90% of
/// the cap or at most 100 segments remain.
fn enforce_rolling_eviction(config: &VideoSinkConfig, state: &mut WriterState) -> std::io::Result<()> {
    let total: u64 = state.segments.iter().map(|s| s.size_bytes).sum();
    let usage_ratio = disk_usage_ratio(&config.output_dir).unwrap_or(0.0);

    if total <= config.max_total_size_bytes && usage_ratio <= config.max_disk_usage_ratio && state.segments.len() <= 100 {
        return Ok(());
    }

    sort_oldest_first(state.segments.make_contiguous());
    let target = (config.max_total_size_bytes as f64 * 0.9) as u64;
    let mut total = total;
    while (total > target || state.segments.len() > 100) && !state.segments.is_empty() {
        let oldest = state.segments.pop_front().expect("checked non-empty");
        let _ = fs::remove_file(&oldest.path);
        total = total.saturating_sub(oldest.size_bytes);
    }
    Ok(())
}

fn disk_usage_ratio(path: &Path) -> Option<f64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let best = disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())?;

    let total = best.total_space() as f64;
    if total == 0.0 {
        return Some(0.0);
    }
    Some(1.0 - (best.available_space() as f64 / total))
}

/// On startup, scans `output_dir` for existing `.mp4` segments and seeds
/// the eviction list, parsing `created_time` from the filename and
/// falling back to file ctime.
fn preload_segments(output_dir: &Path) -> std::io::Result<VecDeque<SegmentFile>> {
    let mut segments = Vec::new();
    for entry in walkdir::WalkDir::new(output_dir).min_depth(1).max_depth(1).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("mp4") {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().to_string();
        let metadata = entry.metadata()?;
        let created_time = SegmentFile::parse_created_time_from_filename(&filename)
            .or_else(|| metadata.created().ok().map(chrono::DateTime::<chrono::Utc>::from))
            .unwrap_or_else(chrono::Utc::now);
        segments.push(SegmentFile { path: path.to_path_buf(), size_bytes: metadata.len(), created_time, frame_count: 0 });
    }
    sort_oldest_first(&mut segments);
    Ok(segments.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preload_segments_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let segments = preload_segments(dir.path()).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_preload_segments_parses_canonical_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let ts = chrono::Utc::now() - chrono::Duration::hours(1);
        let name = SegmentFile::filename_for(ts);
        fs::write(dir.path().join(&name), b"fake mp4 bytes").unwrap();

        let segments = preload_segments(dir.path()).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].created_time, ts);
    }

    #[tokio::test]
    async fn test_video_sink_writes_frames_and_creates_segment() {
        let dir = tempfile::tempdir().unwrap();
        let config = VideoSinkConfig {
            output_dir: dir.path().to_path_buf(),
            target_resolution: None,
            video_field_name: None,
            segment_duration: Duration::from_secs(300),
            max_total_size_bytes: 10 * 1024 * 1024 * 1024,
            max_disk_usage_ratio: 0.95,
            configured_fps: None,
        };
        let sink = VideoSink::new(config).unwrap();

        use orchestrator_domain::value_objects::{FrameImage, SourceId};
        let frame = FrameEnvelope {
            source_id: SourceId::new("camera-0"),
            frame_id: 1,
            frame_timestamp_ms: chrono::Utc::now().timestamp_millis(),
            image: FrameImage::new(4, 4, vec![0u8; 4 * 4 * 3]),
            prediction: std::collections::HashMap::new(),
        };
        sink.on_prediction(frame);
        sink.close();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_measured_fps_needs_at_least_two_samples() {
        let mut window = VecDeque::new();
        assert_eq!(measured_fps(&window), None);
        push_timestamp(&mut window, 0);
        assert_eq!(measured_fps(&window), None);
    }

    #[test]
    fn test_measured_fps_from_even_spacing() {
        let mut window = VecDeque::new();
        for ts in [0, 100, 200, 300, 400] {
            push_timestamp(&mut window, ts);
        }
        let fps = measured_fps(&window).unwrap();
        assert!((fps - 10.0).abs() < 1e-6, "expected ~10fps, got {fps}");
    }

    #[test]
    fn test_push_timestamp_evicts_outside_trailing_window() {
        let mut window = VecDeque::new();
        push_timestamp(&mut window, 0);
        push_timestamp(&mut window, 500);
        push_timestamp(&mut window, 2_000);
        assert_eq!(window.front(), Some(&500));
    }

    fn empty_writer_state() -> WriterState {
        WriterState {
            segments: VecDeque::new(),
            current_path: None,
            current_file: None,
            segment_started_at: None,
            frames_since_check: 0,
            frame_count_current: 0,
            recent_timestamps_ms: VecDeque::new(),
            last_measured_fps: None,
        }
    }

    fn base_config(dir: &Path) -> VideoSinkConfig {
        VideoSinkConfig {
            output_dir: dir.to_path_buf(),
            target_resolution: None,
            video_field_name: None,
            segment_duration: Duration::from_secs(300),
            max_total_size_bytes: 10 * 1024 * 1024 * 1024,
            max_disk_usage_ratio: 0.95,
            configured_fps: None,
        }
    }

    #[test]
    fn test_effective_fps_prefers_configured_over_measured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        config.configured_fps = Some(24.0);
        let mut state = empty_writer_state();
        push_timestamp(&mut state.recent_timestamps_ms, 0);
        push_timestamp(&mut state.recent_timestamps_ms, 100);
        assert_eq!(effective_fps(&config, &state), 24.0);
    }

    #[test]
    fn test_effective_fps_ignores_non_positive_configured_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = base_config(dir.path());
        config.configured_fps = Some(0.0);
        let mut state = empty_writer_state();
        push_timestamp(&mut state.recent_timestamps_ms, 0);
        push_timestamp(&mut state.recent_timestamps_ms, 500);
        assert_eq!(effective_fps(&config, &state), 2.0);
    }

    #[test]
    fn test_effective_fps_falls_back_to_last_measured_across_segment_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path());
        let mut state = empty_writer_state();
        state.last_measured_fps = Some(15.0);
        assert_eq!(effective_fps(&config, &state), 15.0);
    }

    #[test]
    fn test_effective_fps_falls_back_to_default_for_first_ever_segment() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path());
        let state = empty_writer_state();
        assert_eq!(effective_fps(&config, &state), DEFAULT_FALLBACK_FPS);
    }

    #[test]
    fn test_scale_to_target_preserves_aspect_and_forces_even_dims() {
        let buf: RgbImage = ImageBuffer::from_pixel(10, 5, Rgb([1, 2, 3]));
        let scaled = scale_to_target(buf, Some((7, 7)));
        assert_eq!(scaled.height() % 2, 0);
        assert_eq!(scaled.width() % 2, 0);
        assert!(scaled.width() <= 8 && scaled.height() <= 8);
    }

    #[test]
    fn test_scale_to_target_is_noop_without_target() {
        let buf: RgbImage = ImageBuffer::from_pixel(9, 3, Rgb([1, 2, 3]));
        let scaled = scale_to_target(buf.clone(), None);
        assert_eq!(scaled.dimensions(), buf.dimensions());
    }

    #[test]
    fn test_overlay_stats_draws_pixels_into_buffer() {
        let mut buf: RgbImage = ImageBuffer::from_pixel(40, 40, Rgb([0, 0, 0]));
        overlay_stats(&mut buf, 30.0, 1);
        let bar_pixel = *buf.get_pixel(3, 2);
        assert_eq!(bar_pixel, Rgb([0, 220, 0]));
        let tick_pixel = *buf.get_pixel(3, 0);
        assert_eq!(tick_pixel, Rgb([220, 0, 0]));
    }
}
