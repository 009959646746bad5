//! Writing captured frames to disk.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use turnscan_common::error::{ScanError, ScanResult};
use turnscan_scan_model::frame::{Frame, PixelFormat};

/// Stores one frame at a path chosen by the sequencer.
pub trait FramePersister: Send {
    fn save(&mut self, path: &Path, frame: &Frame) -> ScanResult<()>;
}

/// Uncompressed TIFF output through the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TiffPersister;

impl TiffPersister {
    pub fn new() -> Self {
        Self
    }
}

impl FramePersister for TiffPersister {
    fn save(&mut self, path: &Path, frame: &Frame) -> ScanResult<()> {
        let image = to_image(frame).ok_or_else(|| {
            ScanError::persist(path, "frame buffer does not match its dimensions")
        })?;
        image
            .save_with_format(path, ImageFormat::Tiff)
            .map_err(|e| ScanError::persist(path, e.to_string()))?;
        tracing::debug!(path = %path.display(), frame = %frame.id(), "Frame saved");
        Ok(())
    }
}

/// Convert a frame to an owned image, dropping row padding and swapping
/// BGR to RGB.
pub fn to_image(frame: &Frame) -> Option<DynamicImage> {
    let mut packed = Vec::with_capacity(
        frame.cols() as usize * frame.rows() as usize * frame.format().bytes_per_pixel(),
    );
    for y in 0..frame.rows() {
        let row = frame.row(y);
        match frame.format() {
            PixelFormat::Mono8 | PixelFormat::Rgb8 => packed.extend_from_slice(row),
            PixelFormat::Bgr8 => {
                for bgr in row.chunks_exact(3) {
                    packed.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
                }
            }
        }
    }

    match frame.format() {
        PixelFormat::Mono8 => {
            GrayImage::from_raw(frame.cols(), frame.rows(), packed).map(DynamicImage::ImageLuma8)
        }
        PixelFormat::Rgb8 | PixelFormat::Bgr8 => {
            RgbImage::from_raw(frame.cols(), frame.rows(), packed).map(DynamicImage::ImageRgb8)
        }
    }
}
