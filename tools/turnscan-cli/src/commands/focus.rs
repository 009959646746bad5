//! Score image files for focus.

use std::path::{Path, PathBuf};

use anyhow::Context;
use turnscan_common::config::AppConfig;
use turnscan_processing_core::{focus_window, FocusScorer, FocusSweep, SweepStatus};
use turnscan_scan_model::frame::{Frame, FrameId, PixelFormat};
use turnscan_scan_model::geometry::Rect;

fn load_frame(path: &Path, id: u64) -> anyhow::Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("Failed to read image {}", path.display()))?
        .to_rgb8();
    let (cols, rows) = image.dimensions();
    Ok(Frame::packed(
        FrameId(id),
        image.into_raw(),
        rows,
        cols,
        PixelFormat::Rgb8,
        0.0,
    )?)
}

pub fn run(
    config: &AppConfig,
    images: Vec<PathBuf>,
    roi: Option<Rect>,
    window: bool,
    sweep: bool,
) -> anyhow::Result<()> {
    let scorer = match roi {
        Some(_) => FocusScorer::new(1.0),
        None => FocusScorer::from_config(&config.focus),
    };
    let mut peak_search = FocusSweep::with_defaults();
    let mut best: Option<(f64, &Path)> = None;

    for (index, path) in images.iter().enumerate() {
        let frame = load_frame(path, index as u64)?;
        let region = roi.map(|roi| {
            if window {
                focus_window(
                    &roi,
                    &frame.bounds(),
                    config.focus.window_width,
                    config.focus.window_height,
                )
            } else {
                roi
            }
        });

        let score = scorer.score(&frame, region.as_ref());
        tracing::debug!(path = %path.display(), score, "Scored image");
        println!("{score:>14.3}  {}", path.display());

        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, path.as_path()));
        }
        if sweep {
            if let SweepStatus::PeakFound(peak) = peak_search.push(index as f64, score) {
                println!();
                println!(
                    "Focus peak at step {} ({})",
                    peak.setting,
                    images[peak.setting as usize].display()
                );
                return Ok(());
            }
        }
    }

    if let Some((score, path)) = best {
        println!();
        println!("Sharpest: {} ({score:.3})", path.display());
    }
    Ok(())
}
