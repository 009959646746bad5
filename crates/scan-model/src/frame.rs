//! Camera frames.
//!
//! A [`Frame`] is a read-only view of one camera buffer. Pixel data is
//! reference counted so frames can cross the delivery channel and be
//! cropped without copying the source buffer more than once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use turnscan_common::error::{ScanError, ScanResult};

use crate::geometry::Rect;

/// Monotonically increasing frame sequence number.
///
/// Two deliveries of the same frame carry the same id; duplicate
/// detection compares ids, never buffer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Thread-safe allocator of [`FrameId`]s for a frame source.
#[derive(Debug, Default)]
pub struct FrameSequence {
    next: AtomicU64,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> FrameId {
        FrameId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Layout of one pixel in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Mono8,
    Rgb8,
    Bgr8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }

    /// Single-channel intensity of one pixel using BT.601 luma weights.
    pub fn luma(self, pixel: &[u8]) -> f64 {
        match self {
            PixelFormat::Mono8 => pixel[0] as f64,
            PixelFormat::Rgb8 => {
                0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64
            }
            PixelFormat::Bgr8 => {
                0.114 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.299 * pixel[2] as f64
            }
        }
    }
}

/// One camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    id: FrameId,
    data: Arc<[u8]>,
    rows: u32,
    cols: u32,
    stride: usize,
    format: PixelFormat,
    timestamp: f64,
}

impl Frame {
    /// Wrap a camera buffer, checking that it is large enough for the
    /// stated geometry.
    ///
    /// `stride` is the byte distance between row starts; `timestamp` is the
    /// capture time in seconds since the camera's epoch.
    pub fn new(
        id: FrameId,
        data: impl Into<Arc<[u8]>>,
        rows: u32,
        cols: u32,
        stride: usize,
        format: PixelFormat,
        timestamp: f64,
    ) -> ScanResult<Self> {
        let data = data.into();
        let row_bytes = cols as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(ScanError::camera(
                "Malformed frame buffer",
                format!("stride {stride} shorter than row of {row_bytes} bytes"),
            ));
        }
        let needed = if rows == 0 {
            0
        } else {
            stride * (rows as usize - 1) + row_bytes
        };
        if data.len() < needed {
            return Err(ScanError::camera(
                "Malformed frame buffer",
                format!("{} bytes supplied, {needed} required", data.len()),
            ));
        }

        Ok(Self {
            id,
            data,
            rows,
            cols,
            stride,
            format,
            timestamp,
        })
    }

    /// A tightly packed frame (stride equals the row width).
    pub fn packed(
        id: FrameId,
        data: impl Into<Arc<[u8]>>,
        rows: u32,
        cols: u32,
        format: PixelFormat,
        timestamp: f64,
    ) -> ScanResult<Self> {
        let stride = cols as usize * format.bytes_per_pixel();
        Self::new(id, data, rows, cols, stride, format, timestamp)
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Capture time in seconds since the camera's epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Raw buffer, including any row padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The full frame as a rect in pixel coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.cols as f64, self.rows as f64)
    }

    /// Pixel bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        let len = self.cols as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Bytes of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = x as usize * bpp;
        &self.row(y)[offset..offset + bpp]
    }

    /// Copy of the pixels inside `roi`, clipped to the frame.
    ///
    /// The ROI is snapped to whole pixels by rounding each border. Returns
    /// `None` when nothing of the ROI lies inside the frame. The copy keeps
    /// this frame's id and timestamp.
    pub fn crop(&self, roi: &Rect) -> Option<Frame> {
        let clipped = roi.intersection(&self.bounds());
        let x0 = clipped.left.round().max(0.0) as u32;
        let y0 = clipped.top.round().max(0.0) as u32;
        let x1 = (clipped.right().round() as u32).min(self.cols);
        let y1 = (clipped.bottom().round() as u32).min(self.rows);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let bpp = self.format.bytes_per_pixel();
        let cols = x1 - x0;
        let rows = y1 - y0;
        let mut data = Vec::with_capacity(cols as usize * rows as usize * bpp);
        for y in y0..y1 {
            let row = self.row(y);
            data.extend_from_slice(&row[x0 as usize * bpp..x1 as usize * bpp]);
        }

        Some(Frame {
            id: self.id,
            data: data.into(),
            rows,
            cols,
            stride: cols as usize * bpp,
            format: self.format,
            timestamp: self.timestamp,
        })
    }

    /// Row-major single-channel intensity image.
    pub fn intensity(&self) -> Vec<f64> {
        let bpp = self.format.bytes_per_pixel();
        let mut out = Vec::with_capacity(self.cols as usize * self.rows as usize);
        for y in 0..self.rows {
            out.extend(
                self.row(y)
                    .chunks_exact(bpp)
                    .map(|pixel| self.format.luma(pixel)),
            );
        }
        out
    }

    /// Shrink by `factor` (e.g. 0.25) using box averaging over whole-pixel
    /// blocks. Factors at or above 1.0 return an unchanged copy.
    pub fn downscale(&self, factor: f64) -> Frame {
        if !(factor > 0.0 && factor < 1.0) {
            return self.clone();
        }
        let step = (1.0 / factor).round().max(1.0) as u32;
        let cols = (self.cols / step).max(1).min(self.cols);
        let rows = (self.rows / step).max(1).min(self.rows);
        if cols == 0 || rows == 0 || step == 1 {
            return self.clone();
        }

        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(cols as usize * rows as usize * bpp);
        for by in 0..rows {
            for bx in 0..cols {
                let mut sums = [0u32; 3];
                let mut count = 0u32;
                for y in (by * step)..((by + 1) * step).min(self.rows) {
                    for x in (bx * step)..((bx + 1) * step).min(self.cols) {
                        for (sum, byte) in sums.iter_mut().zip(self.pixel(x, y)) {
                            *sum += *byte as u32;
                        }
                        count += 1;
                    }
                }
                let count = count.max(1);
                data.extend(sums[..bpp].iter().map(|s| ((s + count / 2) / count) as u8));
            }
        }

        Frame {
            id: self.id,
            data: data.into(),
            rows,
            cols,
            stride: cols as usize * bpp,
            format: self.format,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(cols: u32, rows: u32) -> Frame {
        let data: Vec<u8> = (0..rows)
            .flat_map(|y| (0..cols).map(move |x| (x + y * cols) as u8))
            .collect();
        Frame::packed(FrameId(7), data, rows, cols, PixelFormat::Mono8, 1.5).unwrap()
    }

    #[test]
    fn test_rejects_short_buffer() {
        let result = Frame::packed(FrameId(0), vec![0u8; 10], 4, 4, PixelFormat::Mono8, 0.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_short_stride() {
        let result = Frame::new(FrameId(0), vec![0u8; 64], 4, 4, 8, PixelFormat::Rgb8, 0.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_padded_rows() {
        // 2x2 mono frame with 2 bytes of padding per row.
        let data = vec![1, 2, 0xff, 0xff, 3, 4, 0xff, 0xff];
        let frame = Frame::new(FrameId(0), data, 2, 2, 4, PixelFormat::Mono8, 0.0).unwrap();
        assert_eq!(frame.row(1), &[3, 4]);
        assert_eq!(frame.intensity(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_crop_keeps_identity_and_clips() {
        let frame = gradient(8, 8);
        let crop = frame.crop(&Rect::new(6.0, 6.0, 10.0, 10.0)).unwrap();
        assert_eq!(crop.id(), FrameId(7));
        assert_eq!(crop.timestamp(), 1.5);
        assert_eq!((crop.cols(), crop.rows()), (2, 2));
        assert_eq!(crop.pixel(0, 0), frame.pixel(6, 6));
        assert_eq!(crop.pixel(1, 1), frame.pixel(7, 7));
    }

    #[test]
    fn test_crop_outside_is_none() {
        let frame = gradient(8, 8);
        assert!(frame.crop(&Rect::new(20.0, 20.0, 5.0, 5.0)).is_none());
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(PixelFormat::Mono8.luma(&[200]), 200.0);
        let rgb = PixelFormat::Rgb8.luma(&[255, 0, 0]);
        let bgr = PixelFormat::Bgr8.luma(&[0, 0, 255]);
        assert!((rgb - bgr).abs() < 1e-9);
        assert!((rgb - 76.245).abs() < 1e-9);
    }

    #[test]
    fn test_downscale_box_average() {
        let data = vec![0, 4, 8, 12, 0, 4, 8, 12];
        let frame = Frame::packed(FrameId(1), data, 2, 4, PixelFormat::Mono8, 0.0).unwrap();
        let small = frame.downscale(0.5);
        assert_eq!((small.cols(), small.rows()), (2, 1));
        assert_eq!(small.data(), &[2, 10]);
        assert_eq!(frame.downscale(1.0).cols(), 4);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let seq = FrameSequence::new();
        let a = seq.next_id();
        let b = seq.next_id();
        assert!(b > a);
    }
}
