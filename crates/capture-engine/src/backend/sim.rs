//! Simulated camera and stage.
//!
//! Both behave like the real devices at the trait boundary: the camera
//! calls back from its own thread with increasing frame ids and
//! timestamps, and the stage moves toward its commanded angle over wall
//! time at the configured velocity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use turnscan_common::error::{ScanError, ScanResult};
use turnscan_scan_model::frame::{Frame, FrameSequence, PixelFormat};

use super::{FrameCallback, FrameSource, StageController};

/// Device name that selects the simulated rig in [`connect_camera`] and
/// [`connect_stage`].
pub const SIMULATED_DEVICE: &str = "sim";

/// Open a camera by device name.
pub fn connect_camera(device: &str) -> ScanResult<Box<dyn FrameSource>> {
    match device.trim() {
        SIMULATED_DEVICE | "simulated" => {
            tracing::info!("Connected to simulated camera");
            Ok(Box::new(SimulatedCamera::default()))
        }
        "" => Err(ScanError::hardware_unavailable("No cameras detected")),
        other => Err(ScanError::hardware_unavailable(format!(
            "Unable to connect to camera '{other}'"
        ))),
    }
}

/// Open a rotation stage by device name.
pub fn connect_stage(device: &str) -> ScanResult<Box<dyn StageController>> {
    match device.trim() {
        SIMULATED_DEVICE | "simulated" => {
            tracing::info!("Connected to simulated stage");
            Ok(Box::new(SimulatedStage::default()))
        }
        "" => Err(ScanError::hardware_unavailable("No stage detected")),
        other => Err(ScanError::hardware_unavailable(format!(
            "Unable to connect to stage '{other}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

struct Streamer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Streams a synthetic textured pattern at a fixed rate.
pub struct SimulatedCamera {
    cols: u32,
    rows: u32,
    interval: Duration,
    sequence: Arc<FrameSequence>,
    epoch: Instant,
    streamer: Option<Streamer>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(640, 480, 20)
    }
}

impl SimulatedCamera {
    pub fn new(cols: u32, rows: u32, fps: u32) -> Self {
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
            interval: Duration::from_secs(1) / fps.max(1),
            sequence: Arc::new(FrameSequence::new()),
            epoch: Instant::now(),
            streamer: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streamer.is_some()
    }

    fn halt(&mut self) {
        if let Some(streamer) = self.streamer.take() {
            streamer.stop.store(true, Ordering::SeqCst);
            if streamer.handle.join().is_err() {
                tracing::warn!("Simulated camera thread panicked");
            }
        }
    }
}

/// Diagonal stripes drifting one pixel per frame, so consecutive frames
/// differ and every frame has plenty of edges to score.
fn pattern(cols: u32, rows: u32, phase: u64) -> Vec<u8> {
    let phase = (phase % 16) as u32;
    (0..rows)
        .flat_map(|y| {
            (0..cols).map(move |x| {
                if ((x + y + phase) / 8) % 2 == 0 {
                    220
                } else {
                    30
                }
            })
        })
        .collect()
}

impl FrameSource for SimulatedCamera {
    fn register_callback(&mut self, callback: FrameCallback) -> ScanResult<()> {
        self.halt();

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let sequence = self.sequence.clone();
        let (cols, rows, interval, epoch) = (self.cols, self.rows, self.interval, self.epoch);

        let handle = std::thread::Builder::new()
            .name("sim-camera".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    let id = sequence.next_id();
                    let timestamp = epoch.elapsed().as_secs_f64();
                    let data = pattern(cols, rows, id.0);
                    match Frame::packed(id, data, rows, cols, PixelFormat::Mono8, timestamp) {
                        Ok(frame) => callback(frame),
                        Err(e) => tracing::warn!(error = %e, "Simulated frame rejected"),
                    }
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| ScanError::camera("Unable to start capture", e.to_string()))?;

        self.streamer = Some(Streamer { stop, handle });
        tracing::debug!(cols, rows, "Simulated camera streaming");
        Ok(())
    }

    fn unregister_callback(&mut self) -> ScanResult<()> {
        self.halt();
        Ok(())
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.halt();
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Limits of a [`SimulatedStage`].
#[derive(Debug, Clone)]
pub struct StageDriveConfig {
    pub initial_position: f64,
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub acceleration: f64,
}

impl Default for StageDriveConfig {
    fn default() -> Self {
        Self {
            initial_position: 0.0,
            min_velocity: 0.0,
            max_velocity: 10.0,
            acceleration: 5.0,
        }
    }
}

#[derive(Debug)]
struct StageState {
    position: f64,
    target: f64,
    min_velocity: f64,
    max_velocity: f64,
    updated_at: Instant,
}

impl StageState {
    /// Move toward the target at `max_velocity` for the time since the last
    /// update. Ramps are not modelled.
    fn advance(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.updated_at).as_secs_f64();
        self.updated_at = now;
        let remaining = self.target - self.position;
        let step = self.max_velocity.max(0.0) * dt;
        if remaining.abs() <= step {
            self.position = self.target;
        } else {
            self.position += step.copysign(remaining);
        }
    }
}

/// A constant-velocity rotation stage. Clones share the same stage.
#[derive(Debug, Clone)]
pub struct SimulatedStage {
    state: Arc<Mutex<StageState>>,
    acceleration: f64,
}

impl Default for SimulatedStage {
    fn default() -> Self {
        Self::new(StageDriveConfig::default())
    }
}

impl SimulatedStage {
    pub fn new(config: StageDriveConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(StageState {
                position: config.initial_position,
                target: config.initial_position,
                min_velocity: config.min_velocity,
                max_velocity: config.max_velocity,
                updated_at: Instant::now(),
            })),
            acceleration: config.acceleration,
        }
    }

    /// Whether the stage is still short of its commanded angle.
    pub fn is_moving(&self) -> bool {
        let mut state = self.lock();
        state.advance(Instant::now());
        state.position != state.target
    }

    fn lock(&self) -> MutexGuard<'_, StageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn check_velocity(velocity: f64) -> ScanResult<()> {
    if velocity.is_finite() && velocity >= 0.0 {
        Ok(())
    } else {
        Err(ScanError::stage(format!("Invalid velocity {velocity}")))
    }
}

impl StageController for SimulatedStage {
    fn position(&self) -> ScanResult<f64> {
        let mut state = self.lock();
        state.advance(Instant::now());
        Ok(state.position)
    }

    fn set_position(&mut self, degrees: f64) -> ScanResult<()> {
        if !degrees.is_finite() {
            return Err(ScanError::stage(format!("Invalid position {degrees}")));
        }
        let mut state = self.lock();
        state.advance(Instant::now());
        state.target = degrees;
        tracing::debug!(from = state.position, to = degrees, "Simulated stage moving");
        Ok(())
    }

    fn min_velocity(&self) -> ScanResult<f64> {
        Ok(self.lock().min_velocity)
    }

    fn set_min_velocity(&mut self, velocity: f64) -> ScanResult<()> {
        check_velocity(velocity)?;
        self.lock().min_velocity = velocity;
        Ok(())
    }

    fn max_velocity(&self) -> ScanResult<f64> {
        Ok(self.lock().max_velocity)
    }

    fn set_max_velocity(&mut self, velocity: f64) -> ScanResult<()> {
        check_velocity(velocity)?;
        let mut state = self.lock();
        state.advance(Instant::now());
        state.max_velocity = velocity;
        Ok(())
    }

    fn acceleration(&self) -> ScanResult<f64> {
        Ok(self.acceleration)
    }

    fn stop(&mut self) -> ScanResult<()> {
        let mut state = self.lock();
        state.advance(Instant::now());
        state.target = state.position;
        Ok(())
    }
}
