//! Hardware interfaces for the camera and the rotation stage.

use turnscan_common::error::ScanResult;
use turnscan_scan_model::frame::Frame;

pub mod sim;

pub use sim::{connect_camera, connect_stage, SimulatedCamera, SimulatedStage, StageDriveConfig};

/// Callback a [`FrameSource`] invokes for every frame, from its own thread.
pub type FrameCallback = Box<dyn Fn(Frame) + Send + Sync>;

/// A camera that pushes frames to a single registered callback.
pub trait FrameSource: Send {
    /// Start delivering frames to `callback`, replacing any previous one.
    fn register_callback(&mut self, callback: FrameCallback) -> ScanResult<()>;

    /// Stop delivering frames. Returns once no further callback invocation
    /// can start. Safe to call when nothing is registered.
    fn unregister_callback(&mut self) -> ScanResult<()>;
}

/// A motorised rotation stage. Angles are in degrees, velocities in
/// degrees per second.
pub trait StageController: Send {
    /// Current angle.
    fn position(&self) -> ScanResult<f64>;

    /// Command a move to `degrees`. Returns once the move is accepted, not
    /// when it completes.
    fn set_position(&mut self, degrees: f64) -> ScanResult<()>;

    fn min_velocity(&self) -> ScanResult<f64>;
    fn set_min_velocity(&mut self, velocity: f64) -> ScanResult<()>;
    fn max_velocity(&self) -> ScanResult<f64>;
    fn set_max_velocity(&mut self, velocity: f64) -> ScanResult<()>;

    /// Read-only ramp acceleration.
    fn acceleration(&self) -> ScanResult<f64>;

    /// Halt any motion in progress.
    fn stop(&mut self) -> ScanResult<()>;
}
