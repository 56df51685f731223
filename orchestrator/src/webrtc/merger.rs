//! # Frame Merger
//!
//! Combines one frame per attached source into a single composite image
//! for the WebRTC viewer: a single source passes through
//! unchanged, two sources are concatenated horizontally (height
//! normalized to the taller source, widths summed rather than forced
//! equal), and three or more are tiled into a square-ish grid with every
//! cell resized to the largest source resolution.

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb, RgbImage};
use orchestrator_domain::value_objects::{FrameImage, SourceId};

pub fn merge_frames(frames: &[(SourceId, FrameImage)]) -> FrameImage {
    match frames.len() {
        0 => FrameImage::new(1, 1, vec![0u8; 3]),
        1 => frames[0].1.clone(),
        2 => merge_horizontal(&frames[0].1, &frames[1].1),
        _ => merge_grid(frames),
    }
}

fn to_image_buffer(frame: &FrameImage) -> Option<RgbImage> {
    ImageBuffer::<Rgb<u8>, _>::from_raw(frame.width, frame.height, frame.data.to_vec())
}

fn from_image_buffer(buf: RgbImage) -> FrameImage {
    let (width, height) = buf.dimensions();
    FrameImage::new(width, height, buf.into_raw())
}

fn merge_horizontal(a: &FrameImage, b: &FrameImage) -> FrameImage {
    let Some(a_buf) = to_image_buffer(a) else { return b.clone() };
    let Some(b_buf) = to_image_buffer(b) else { return a.clone() };

    let cell_height = a_buf.height().max(b_buf.height());
    let a_buf = image::imageops::resize(&a_buf, a_buf.width(), cell_height, FilterType::Triangle);
    let b_buf = image::imageops::resize(&b_buf, b_buf.width(), cell_height, FilterType::Triangle);

    let mut canvas: RgbImage = ImageBuffer::new(a_buf.width() + b_buf.width(), cell_height);
    image::imageops::replace(&mut canvas, &a_buf, 0, 0);
    image::imageops::replace(&mut canvas, &b_buf, a_buf.width() as i64, 0);
    from_image_buffer(canvas)
}

fn merge_grid(frames: &[(SourceId, FrameImage)]) -> FrameImage {
    let buffers: Vec<RgbImage> = frames.iter().filter_map(|(_, frame)| to_image_buffer(frame)).collect();
    if buffers.is_empty() {
        return FrameImage::new(1, 1, vec![0u8; 3]);
    }

    let cols = (buffers.len() as f64).sqrt().ceil() as u32;
    let rows = (buffers.len() as u32).div_ceil(cols);
    let cell_width = buffers.iter().map(|b| b.width()).max().unwrap_or(1);
    let cell_height = buffers.iter().map(|b| b.height()).max().unwrap_or(1);

    let mut canvas: RgbImage = ImageBuffer::from_pixel(cell_width * cols, cell_height * rows, Rgb([0, 0, 0]));
    for (index, buf) in buffers.iter().enumerate() {
        let resized = image::imageops::resize(buf, cell_width, cell_height, FilterType::Triangle);
        let col = (index as u32) % cols;
        let row = (index as u32) / cols;
        image::imageops::replace(&mut canvas, &resized, (col * cell_width) as i64, (row * cell_height) as i64);
    }
    from_image_buffer(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32) -> FrameImage {
        FrameImage::new(width, height, vec![128u8; (width * height * 3) as usize])
    }

    #[test]
    fn test_single_source_passes_through() {
        let frame = solid(4, 4);
        let merged = merge_frames(&[(SourceId::new("a"), frame.clone())]);
        assert_eq!(merged.width, frame.width);
        assert_eq!(merged.height, frame.height);
    }

    #[test]
    fn test_two_sources_concatenate_horizontally() {
        let merged = merge_frames(&[(SourceId::new("a"), solid(4, 4)), (SourceId::new("b"), solid(4, 4))]);
        assert_eq!(merged.width, 8);
        assert_eq!(merged.height, 4);
    }

    #[test]
    fn test_two_sources_with_differing_widths_concatenate_summed_width() {
        let merged = merge_frames(&[(SourceId::new("a"), solid(6, 4)), (SourceId::new("b"), solid(2, 4))]);
        assert_eq!(merged.width, 8);
        assert_eq!(merged.height, 4);
    }

    #[test]
    fn test_four_sources_tile_into_square_grid() {
        let frames: Vec<_> = (0..4).map(|i| (SourceId::new(format!("s{i}")), solid(2, 2))).collect();
        let merged = merge_frames(&frames);
        assert_eq!(merged.width, 4);
        assert_eq!(merged.height, 4);
    }

    #[test]
    fn test_three_sources_use_two_by_two_grid_with_one_empty_cell() {
        let frames: Vec<_> = (0..3).map(|i| (SourceId::new(format!("s{i}")), solid(2, 2))).collect();
        let merged = merge_frames(&frames);
        assert_eq!(merged.width, 4);
        assert_eq!(merged.height, 4);
    }
}
