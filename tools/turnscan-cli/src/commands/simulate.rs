//! Run a capture sweep against the simulated rig.

use std::path::PathBuf;
use std::time::Duration;

use turnscan_capture_engine::backend::{SimulatedCamera, SimulatedStage, StageDriveConfig};
use turnscan_capture_engine::{
    CaptureSequencer, LogProgress, SessionConfig, SharedProgress, TiffPersister,
};
use turnscan_common::config::{AppConfig, SettlePolicy};
use turnscan_scan_model::geometry::Rect;
use turnscan_scan_model::layout::{CaptureLayout, CaptureType};

pub struct SimulateArgs {
    pub seal: String,
    pub capture_type: CaptureType,
    pub captures_dir: Option<PathBuf>,
    pub roi: Option<Rect>,
    pub rotation: Option<f64>,
    pub settle: Option<f64>,
    pub velocity: Option<f64>,
    pub discard_settle: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

pub async fn run(config: &AppConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let root = args
        .captures_dir
        .unwrap_or_else(|| config.captures_dir.clone());
    let layout = CaptureLayout::new(root, args.seal, args.capture_type)?;

    let bounds = Rect::new(0.0, 0.0, args.width as f64, args.height as f64);
    let roi = args.roi.unwrap_or(bounds);

    let mut session = SessionConfig::from_defaults(&config.capture, Some(roi), PathBuf::new());
    session.output_dir = layout.session_dir(&session.started_at);
    if let Some(rotation) = args.rotation {
        session.target_rotation_degrees = rotation;
    }
    if let Some(settle) = args.settle {
        session.settle_offset_degrees = settle;
    }
    if let Some(velocity) = args.velocity {
        session.velocity = velocity;
    }
    if args.discard_settle {
        session.settle_policy = SettlePolicy::Discard;
    }

    println!("Simulated scan: {}", layout.seal_name);
    println!("  Output: {}", session.output_dir.display());
    println!(
        "  Sweep: {} + {} degrees at {} deg/s",
        session.target_rotation_degrees, session.settle_offset_degrees, session.velocity
    );
    println!("  ROI: {roi:?}");
    println!();

    let camera = SimulatedCamera::new(args.width, args.height, args.fps);
    let stage = SimulatedStage::new(StageDriveConfig::default());
    let control = SharedProgress::new();
    let mut sequencer = CaptureSequencer::new(
        camera,
        stage,
        TiffPersister::new(),
        LogProgress::wrapping(control.clone()),
    );

    sequencer.start(session)?;

    println!("Press Ctrl+C to cancel...");
    let cancel = control.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Cancel requested");
            cancel.cancel();
        }
    });

    let poll = Duration::from_millis(config.preview.frame_interval_ms.max(1));
    let summary = tokio::task::spawn_blocking(move || sequencer.run(poll)).await?;
    signal.abort();

    println!();
    match summary {
        Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        None => println!("Session ended without a summary"),
    }
    Ok(())
}
