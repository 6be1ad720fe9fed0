//! Still-image capture of a detected face for an identity's representative image.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{BoundingBox, RepresentativeImage};

/// A packed RGB8 video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major.
    pub rgb: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, Error> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(Error::InvalidInput(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height} RGB",
                rgb.len()
            )));
        }
        Ok(Self { width, height, rgb })
    }
}

/// Crop margin and JPEG quality for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// Pixels added around the bounding box on every side.
    pub margin: u32,
    /// JPEG quality, 1–100.
    pub quality: u8,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            margin: 20,
            quality: 80,
        }
    }
}

/// Crop `bbox` plus a margin out of `frame` and encode it as JPEG.
///
/// The crop is clamped to the frame. A box lying entirely outside the frame
/// is rejected.
pub fn capture_face(
    frame: &Frame,
    bbox: &BoundingBox,
    settings: &SnapshotSettings,
) -> Result<RepresentativeImage, Error> {
    let (x, y, width, height) = crop_region(frame, bbox, settings.margin)?;

    let full = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
        .ok_or_else(|| Error::InvalidInput("frame buffer too small for its dimensions".into()))?;
    let crop = image::imageops::crop_imm(&full, x, y, width, height).to_image();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, settings.quality.clamp(1, 100))
        .encode_image(&crop)
        .map_err(|e| Error::Image(e.to_string()))?;

    tracing::debug!(x, y, width, height, bytes = jpeg.len(), "snapshot encoded");
    Ok(RepresentativeImage::new(jpeg))
}

/// Pixel rectangle `(x, y, width, height)` covering `bbox` grown by `margin`.
fn crop_region(frame: &Frame, bbox: &BoundingBox, margin: u32) -> Result<(u32, u32, u32, u32), Error> {
    let margin = margin as f32;
    let frame_w = frame.width as f32;
    let frame_h = frame.height as f32;

    let x = (bbox.x - margin).max(0.0).floor();
    let y = (bbox.y - margin).max(0.0).floor();
    let width = (bbox.width + margin * 2.0).min(frame_w - x).floor();
    let height = (bbox.height + margin * 2.0).min(frame_h - y).floor();

    if !(width >= 1.0 && height >= 1.0) {
        return Err(Error::InvalidInput(format!(
            "bounding box ({}, {}, {}x{}) lies outside the {}x{} frame",
            bbox.x, bbox.y, bbox.width, bbox.height, frame.width, frame.height
        )));
    }
    Ok((x as u32, y as u32, width as u32, height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn gray_frame(width: u32, height: u32) -> Frame {
        Frame::new(width, height, vec![128; (width * height * 3) as usize]).unwrap()
    }

    fn bbox(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox { x, y, width, height }
    }

    #[test]
    fn test_frame_length_checked() {
        assert!(Frame::new(2, 2, vec![0; 12]).is_ok());
        assert!(Frame::new(2, 2, vec![0; 11]).unwrap_err().is_invalid_input());
    }

    #[test]
    fn test_crop_region_with_margin() {
        let frame = gray_frame(200, 100);
        assert_eq!(crop_region(&frame, &bbox(50.0, 30.0, 40.0, 40.0), 20).unwrap(), (30, 10, 80, 80));
    }

    #[test]
    fn test_crop_region_clamped_to_frame() {
        let frame = gray_frame(100, 100);
        assert_eq!(crop_region(&frame, &bbox(5.0, 80.0, 40.0, 40.0), 20).unwrap(), (0, 60, 80, 40));
    }

    #[test]
    fn test_crop_region_outside_frame() {
        let frame = gray_frame(100, 100);
        assert!(crop_region(&frame, &bbox(150.0, 10.0, 20.0, 20.0), 20).is_err());
    }

    #[test]
    fn test_capture_face_encodes_jpeg() {
        let frame = gray_frame(64, 48);
        let image = capture_face(&frame, &bbox(10.0, 10.0, 20.0, 20.0), &SnapshotSettings::default())
            .unwrap();
        let bytes = image.as_bytes();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);

        let decoded = image::load_from_memory(bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (60, 48));
    }
}
