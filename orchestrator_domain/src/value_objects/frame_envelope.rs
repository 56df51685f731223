//! # Frame Envelope Value Object
//!
//! What flows through the sink chain on every `on_prediction` call. The
//! `image` and `prediction` payloads are intentionally untyped here — the
//! model runtime and frame-source driver that produce them are out of
//! scope — but the envelope shape is the contract every sink is
//! written against.

use crate::value_objects::SourceId;
use std::sync::Arc;

/// A decoded video frame, owned so it can be cheaply shared across the
/// `BufferSink` ring, the `VideoSink` writer thread, and the WebRTC
/// frame merger without re-copying pixel data per consumer.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8 pixel data, row-major.
    pub data: Arc<[u8]>,
}

impl FrameImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data: Arc::from(data) }
    }
}

/// One named model output: either a structured JSON value or an
/// additional visualizable image (a `WorkflowImage` in the terminology
/// of the original prediction schema).
#[derive(Debug, Clone)]
pub enum PredictionValue {
    Json(serde_json::Value),
    Image(FrameImage),
}

/// `(source_id, frame_id, frame_timestamp, image, prediction)` — the unit
/// handed to every `Sink::on_prediction` call.
#[derive(Debug, Clone)]
pub struct FrameEnvelope {
    pub source_id: SourceId,
    pub frame_id: u64,
    /// Milliseconds since Unix epoch when the frame was captured.
    pub frame_timestamp_ms: i64,
    pub image: FrameImage,
    pub prediction: std::collections::HashMap<String, PredictionValue>,
}

impl FrameEnvelope {
    /// The configured `video_field_name` if present, else the first
    /// `WorkflowImage` output, else the raw input frame — the precedence
    /// `VideoSink` and the WebRTC bridge both use to pick what to render.
    pub fn select_visual<'a>(&'a self, preferred_field: Option<&str>) -> &'a FrameImage {
        if let Some(field) = preferred_field {
            if let Some(PredictionValue::Image(img)) = self.prediction.get(field) {
                return img;
            }
        }
        for value in self.prediction.values() {
            if let PredictionValue::Image(img) = value {
                return img;
            }
        }
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame(prediction: std::collections::HashMap<String, PredictionValue>) -> FrameEnvelope {
        FrameEnvelope {
            source_id: SourceId::new("camera-0"),
            frame_id: 1,
            frame_timestamp_ms: 1_000,
            image: FrameImage::new(4, 4, vec![0u8; 4 * 4 * 3]),
            prediction,
        }
    }

    #[test]
    fn test_select_visual_falls_back_to_raw_frame() {
        let frame = sample_frame(std::collections::HashMap::new());
        let visual = frame.select_visual(None);
        assert_eq!(visual.width, 4);
    }

    #[test]
    fn test_select_visual_prefers_named_field() {
        let mut prediction = std::collections::HashMap::new();
        prediction.insert(
            "annotated".to_string(),
            PredictionValue::Image(FrameImage::new(8, 8, vec![1u8; 8 * 8 * 3])),
        );
        let frame = sample_frame(prediction);
        let visual = frame.select_visual(Some("annotated"));
        assert_eq!(visual.width, 8);
    }

    #[test]
    fn test_select_visual_falls_back_to_any_image_output() {
        let mut prediction = std::collections::HashMap::new();
        prediction.insert(
            "other".to_string(),
            PredictionValue::Image(FrameImage::new(16, 16, vec![2u8; 16 * 16 * 3])),
        );
        let frame = sample_frame(prediction);
        let visual = frame.select_visual(Some("missing_field"));
        assert_eq!(visual.width, 16);
    }
}
