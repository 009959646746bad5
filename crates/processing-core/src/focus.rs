//! Focus-quality scoring.
//!
//! The score is the variance of the 4-neighbour Laplacian response of the
//! frame's intensity image. Edges produce strong second derivatives, so a
//! well-focused view of a scene scores higher than a defocused one. The
//! number has no unit and is only comparable between frames of the same
//! scene at the same scale.
//!
//! ```text
//!   0  1  0
//!   1 -4  1
//!   0  1  0
//! ```
//!
//! Borders use reflect-101 extension (`dcb|abcd|cba`), so a flat image
//! scores exactly zero.

use serde::{Deserialize, Serialize};
use turnscan_common::config::FocusDefaults;
use turnscan_scan_model::frame::{Frame, FrameId};
use turnscan_scan_model::geometry::Rect;

/// A sharpness score tied to the frame it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusSample {
    pub score: f64,
    pub frame: FrameId,
}

/// Computes sharpness scores for frames.
///
/// Stateless apart from its configuration; safe to share between the
/// preview and frame-delivery contexts.
#[derive(Debug, Clone, Copy)]
pub struct FocusScorer {
    /// Scale applied to whole frames before scoring when no ROI is given.
    downscale: f64,
}

impl Default for FocusScorer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl FocusScorer {
    /// Create a scorer. `downscale` (e.g. 0.25) keeps whole-frame scoring
    /// affordable at preview rate; 1.0 scores at full resolution.
    pub fn new(downscale: f64) -> Self {
        let downscale = if downscale > 0.0 && downscale <= 1.0 {
            downscale
        } else {
            1.0
        };
        Self { downscale }
    }

    /// Scorer configured from the application's focus settings.
    pub fn from_config(config: &FocusDefaults) -> Self {
        Self::new(config.downscale)
    }

    pub fn downscale(&self) -> f64 {
        self.downscale
    }

    /// Sharpness of `frame`, restricted to `roi` (source pixels) if given.
    ///
    /// An ROI that misses the frame entirely scores zero.
    pub fn score(&self, frame: &Frame, roi: Option<&Rect>) -> f64 {
        match roi {
            Some(roi) => frame
                .crop(roi)
                .map(|cropped| frame_variance(&cropped))
                .unwrap_or(0.0),
            None if self.downscale < 1.0 => frame_variance(&frame.downscale(self.downscale)),
            None => frame_variance(frame),
        }
    }

    /// [`FocusScorer::score`] tagged with the frame's id.
    pub fn sample(&self, frame: &Frame, roi: Option<&Rect>) -> FocusSample {
        FocusSample {
            score: self.score(frame, roi),
            frame: frame.id(),
        }
    }
}

fn frame_variance(frame: &Frame) -> f64 {
    laplacian_variance(
        frame.cols() as usize,
        frame.rows() as usize,
        &frame.intensity(),
    )
}

/// Variance of the Laplacian response of a row-major intensity image.
pub fn laplacian_variance(width: usize, height: usize, pixels: &[f64]) -> f64 {
    let n = width * height;
    if n == 0 || pixels.len() < n {
        return 0.0;
    }

    let at = |x: usize, y: usize| pixels[y * width + x];
    let mut sum = 0.0;
    let mut sum_sq = 0.0;

    for y in 0..height {
        let up = reflect101(y as isize - 1, height);
        let down = reflect101(y as isize + 1, height);
        for x in 0..width {
            let left = reflect101(x as isize - 1, width);
            let right = reflect101(x as isize + 1, width);
            let response =
                at(x, up) + at(x, down) + at(left, y) + at(right, y) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

/// Reflect an out-of-range index back into `[0, len)` without repeating the
/// edge sample. Only offsets of one step are expected.
fn reflect101(index: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let last = len as isize - 1;
    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    reflected.clamp(0, last) as usize
}

/// Fixed-size window centred on `selection`, kept inside `bounds`.
///
/// Used by the autofocus view, which scores a constant-size patch around
/// the operator's ROI so scores stay comparable while the ROI is edited.
pub fn focus_window(selection: &Rect, bounds: &Rect, width: f64, height: f64) -> Rect {
    let (cx, cy) = selection.center();
    Rect::centered(cx, cy, width, height)
        .clamp_within(bounds)
        .intersection(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use turnscan_scan_model::frame::PixelFormat;

    fn mono(cols: u32, rows: u32, f: impl Fn(u32, u32) -> u8) -> Frame {
        let data: Vec<u8> = (0..rows)
            .flat_map(|y| (0..cols).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Frame::packed(FrameId(1), data, rows, cols, PixelFormat::Mono8, 0.0).unwrap()
    }

    fn step_edge(x: u32) -> u8 {
        if x < 16 {
            0
        } else {
            255
        }
    }

    fn blurred_edge(x: u32) -> u8 {
        match x {
            0..=13 => 0,
            14 => 51,
            15 => 102,
            16 => 153,
            17 => 204,
            _ => 255,
        }
    }

    #[test]
    fn test_flat_image_scores_zero() {
        let frame = mono(32, 32, |_, _| 128);
        assert_eq!(FocusScorer::new(1.0).score(&frame, None), 0.0);
    }

    #[test]
    fn test_sharp_edge_beats_blurred_edge() {
        let scorer = FocusScorer::new(1.0);
        let sharp = scorer.score(&mono(32, 32, |x, _| step_edge(x)), None);
        let blurred = scorer.score(&mono(32, 32, |x, _| blurred_edge(x)), None);
        assert!(sharp > blurred, "sharp {sharp} <= blurred {blurred}");
        assert!(blurred > 0.0);
    }

    #[test]
    fn test_single_pixel_edge() {
        let scorer = FocusScorer::new(1.0);
        let dot = mono(9, 9, |x, y| if x == 4 && y == 4 { 255 } else { 0 });
        let smudge = mono(9, 9, |x, y| match (x.abs_diff(4), y.abs_diff(4)) {
            (0, 0) => 64,
            (dx, dy) if dx <= 1 && dy <= 1 => 24,
            _ => 0,
        });
        assert!(scorer.score(&dot, None) > scorer.score(&smudge, None));
    }

    #[test]
    fn test_roi_restricts_scoring() {
        // Texture on the left half, flat on the right half.
        let frame = mono(32, 16, |x, y| {
            if x < 16 && (x + y) % 2 == 0 {
                255
            } else {
                0
            }
        });
        let scorer = FocusScorer::new(1.0);
        let flat = Rect::new(20.0, 0.0, 12.0, 16.0);
        let textured = Rect::new(0.0, 0.0, 12.0, 16.0);
        assert_eq!(scorer.score(&frame, Some(&flat)), 0.0);
        assert!(scorer.score(&frame, Some(&textured)) > 0.0);
    }

    #[test]
    fn test_roi_outside_frame_scores_zero() {
        let frame = mono(8, 8, |x, _| (x * 30) as u8);
        let scorer = FocusScorer::default();
        assert_eq!(scorer.score(&frame, Some(&Rect::new(50.0, 50.0, 4.0, 4.0))), 0.0);
    }

    #[test]
    fn test_score_is_deterministic_and_non_mutating() {
        let frame = mono(16, 16, |x, y| ((x * 7 + y * 13) % 255) as u8);
        let before = frame.data().to_vec();
        let scorer = FocusScorer::new(0.5);
        let a = scorer.sample(&frame, None);
        let b = scorer.sample(&frame, None);
        assert_eq!(a, b);
        assert_eq!(a.frame, FrameId(1));
        assert_eq!(frame.data(), before.as_slice());
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(2, 5), 2);
        assert_eq!(reflect101(-1, 1), 0);
    }

    #[test]
    fn test_invalid_downscale_falls_back() {
        assert_eq!(FocusScorer::new(0.0).downscale(), 1.0);
        assert_eq!(FocusScorer::new(4.0).downscale(), 1.0);
        assert_eq!(FocusScorer::new(0.25).downscale(), 0.25);
    }

    proptest! {
        #[test]
        fn brightness_offset_does_not_change_score(
            pixels in prop::collection::vec(0.0f64..200.0, 48),
            offset in 0.0f64..55.0,
        ) {
            let base = laplacian_variance(8, 6, &pixels);
            let shifted: Vec<f64> = pixels.iter().map(|p| p + offset).collect();
            let moved = laplacian_variance(8, 6, &shifted);
            prop_assert!(base >= 0.0);
            prop_assert!((base - moved).abs() <= 1e-6 * (1.0 + base));
        }
    }

    #[test]
    fn test_focus_window_centres_and_clamps() {
        let bounds = Rect::new(0.0, 0.0, 4000.0, 3000.0);
        let selection = Rect::new(1000.0, 1000.0, 200.0, 100.0);
        let window = focus_window(&selection, &bounds, 800.0, 600.0);
        assert_eq!(window, Rect::new(700.0, 750.0, 800.0, 600.0));

        let corner = Rect::new(0.0, 0.0, 100.0, 100.0);
        let window = focus_window(&corner, &bounds, 800.0, 600.0);
        assert_eq!(window, Rect::new(0.0, 0.0, 800.0, 600.0));

        let small = Rect::new(0.0, 0.0, 640.0, 480.0);
        let window = focus_window(&corner, &small, 800.0, 600.0);
        assert_eq!(window, small);
    }
}
