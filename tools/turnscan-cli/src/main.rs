//! Turnscan CLI: turntable capture from the command line.
//!
//! Usage:
//!   turnscan simulate <SEAL> [OPTIONS]   Run a scan against the simulated rig
//!   turnscan focus <IMAGES>...           Score image files for sharpness
//!   turnscan check                       Show configuration and hardware status

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use turnscan_common::config::AppConfig;
use turnscan_scan_model::geometry::Rect;
use turnscan_scan_model::layout::CaptureType;

mod commands;

#[derive(Parser)]
#[command(
    name = "turnscan",
    about = "Turntable reflectance capture with live focus feedback",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a full sweep from the simulated camera and stage
    Simulate {
        /// Seal (specimen) name; becomes the top-level capture directory
        seal: String,

        /// Lighting setup: directLED or structuredLight
        #[arg(long, default_value = "directLED")]
        capture_type: CaptureType,

        /// Captures root directory (defaults to the configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Region of interest in source pixels: left,top,width,height
        #[arg(long, value_parser = commands::parse_rect)]
        roi: Option<Rect>,

        /// Rotation in degrees
        #[arg(long)]
        rotation: Option<f64>,

        /// Settle offset in degrees
        #[arg(long)]
        settle: Option<f64>,

        /// Stage velocity in degrees per second
        #[arg(long)]
        velocity: Option<f64>,

        /// Skip frames captured inside the settle window
        #[arg(long)]
        discard_settle: bool,

        /// Simulated sensor width
        #[arg(long, default_value = "640")]
        width: u32,

        /// Simulated sensor height
        #[arg(long, default_value = "480")]
        height: u32,

        /// Simulated frame rate
        #[arg(long, default_value = "20")]
        fps: u32,
    },

    /// Score image files for focus and report the sharpest
    Focus {
        /// Images to score
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Region of interest in source pixels: left,top,width,height
        #[arg(long, value_parser = commands::parse_rect)]
        roi: Option<Rect>,

        /// Score the fixed-size focus window centred on the ROI
        #[arg(long, requires = "roi")]
        window: bool,

        /// Treat the images as consecutive focus steps and find the peak
        #[arg(long)]
        sweep: bool,
    },

    /// Show effective configuration and probe hardware
    Check {
        /// Camera device name
        #[arg(long, default_value = "sim")]
        camera: String,

        /// Stage device name
        #[arg(long, default_value = "sim")]
        stage: String,

        /// Write the effective configuration to the config file if none exists
        #[arg(long)]
        init_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    turnscan_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Simulate {
            seal,
            capture_type,
            output,
            roi,
            rotation,
            settle,
            velocity,
            discard_settle,
            width,
            height,
            fps,
        } => {
            commands::simulate::run(
                &config,
                commands::simulate::SimulateArgs {
                    seal,
                    capture_type,
                    captures_dir: output,
                    roi,
                    rotation,
                    settle,
                    velocity,
                    discard_settle,
                    width,
                    height,
                    fps,
                },
            )
            .await
        }
        Commands::Focus {
            images,
            roi,
            window,
            sweep,
        } => commands::focus::run(&config, images, roi, window, sweep),
        Commands::Check {
            camera,
            stage,
            init_config,
        } => commands::check::run(&config, &camera, &stage, init_config),
    }
}
