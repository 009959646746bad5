//! Capture session state machine.
//!
//! A session starts with the stage at some angle `start`. The stage is
//! commanded past `target = start + rotation + settle` and every frame that
//! arrives while it turns is cropped to the ROI and saved as
//! `<elapsed>_<position>.tiff`. The session ends when a frame is seen at or
//! beyond `target`, when the operator cancels, or when the stage fails.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use turnscan_common::clock::SessionClock;
use turnscan_common::config::{CaptureDefaults, SettlePolicy};
use turnscan_common::error::{ScanError, ScanResult};
use turnscan_scan_model::frame::{Frame, FrameId};
use turnscan_scan_model::geometry::Rect;
use turnscan_scan_model::layout::frame_path;

use crate::backend::{FrameSource, StageController};
use crate::inbox::{frame_channel, Delivery, FrameInbox};
use crate::persist::FramePersister;
use crate::progress::ProgressSink;

/// Failure message recorded when the camera stops delivering mid-session.
pub const SOURCE_DISCONNECTED: &str = "frame source disconnected";

/// Parameters of one capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Nominal rotation to capture, in degrees.
    pub target_rotation_degrees: f64,

    /// Rotation added before the nominal sweep while the stage settles.
    pub settle_offset_degrees: f64,

    /// Stage velocity in degrees per second.
    pub velocity: f64,

    /// Crop applied to every persisted frame, in source pixels. Required.
    pub roi: Option<Rect>,

    /// Directory receiving the frame files. Created on start.
    pub output_dir: PathBuf,

    pub settle_policy: SettlePolicy,

    /// Degrees commanded beyond the target.
    pub overshoot_degrees: f64,

    /// Frames buffered between the camera thread and the sequencer.
    pub frame_queue_depth: usize,

    pub file_extension: String,

    /// Wall-clock start of the session. Name the session directory from
    /// this so the directory and the summary agree.
    pub started_at: DateTime<Local>,
}

impl SessionConfig {
    /// Session using the configured capture defaults.
    pub fn from_defaults(
        defaults: &CaptureDefaults,
        roi: Option<Rect>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            target_rotation_degrees: defaults.target_rotation_degrees,
            settle_offset_degrees: defaults.settle_offset_degrees,
            velocity: defaults.velocity,
            roi,
            output_dir: output_dir.into(),
            settle_policy: defaults.settle_policy,
            overshoot_degrees: defaults.overshoot_degrees,
            frame_queue_depth: defaults.frame_queue_depth,
            file_extension: defaults.file_extension.clone(),
            started_at: Local::now(),
        }
    }

    /// Total sweep covered by progress: rotation plus settle.
    pub fn sweep_degrees(&self) -> f64 {
        self.target_rotation_degrees + self.settle_offset_degrees
    }

    /// Check the parameters and return the ROI.
    fn validate(&self) -> ScanResult<Rect> {
        let roi = self
            .roi
            .map(Rect::normalised)
            .ok_or_else(|| ScanError::config("Select a region of interest before capturing"))?;
        if roi.is_empty() {
            return Err(ScanError::config("The region of interest is empty"));
        }
        let sweep = self.sweep_degrees();
        if !sweep.is_finite() || sweep <= 0.0 || self.settle_offset_degrees < 0.0 {
            return Err(ScanError::config(format!(
                "Invalid sweep: rotation {} + settle {}",
                self.target_rotation_degrees, self.settle_offset_degrees
            )));
        }
        if !self.velocity.is_finite() || self.velocity <= 0.0 {
            return Err(ScanError::config(format!(
                "Stage velocity must be positive, got {}",
                self.velocity
            )));
        }
        if !self.overshoot_degrees.is_finite() || self.overshoot_degrees < 0.0 {
            return Err(ScanError::config("Overshoot must not be negative"));
        }
        Ok(roi)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum StopReason {
    /// A frame arrived at or past the target angle.
    Completed,
    /// The progress sink reported an operator cancel.
    Cancelled,
    /// [`CaptureSequencer::stop`] was called.
    Requested,
    /// A collaborator failed mid-session.
    Failed(String),
}

/// What happened to a session, produced when it ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub output_dir: PathBuf,
    pub started_at: DateTime<Local>,
    pub start_position: f64,
    pub target_position: f64,
    /// Stage angle of the last processed frame.
    pub final_position: f64,
    pub frames_persisted: u64,
    /// Frames that reached the sequencer but were not written.
    pub frames_skipped: u64,
    /// Frames lost to a full queue before reaching the sequencer.
    pub frames_dropped: u64,
    /// Last reported progress fraction.
    pub progress: f64,
    pub duration_secs: f64,
    pub reason: StopReason,
}

/// Result of handing one frame to the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No session is running.
    Inactive,
    /// Same frame id as the previous frame.
    Duplicate,
    /// Written to `path`.
    Persisted { path: PathBuf },
    /// Inside the settle window and discarded by policy.
    Settling,
    /// Could not be cropped or written; the session continues.
    Skipped { reason: String },
    /// The stage could not be read; the session was stopped.
    Aborted,
}

struct ActiveSession {
    roi: Rect,
    output_dir: PathBuf,
    file_extension: String,
    settle_policy: SettlePolicy,
    start_position: f64,
    target_position: f64,
    settle_boundary: f64,
    clock: SessionClock,
    inbox: FrameInbox,
    last_frame: Option<FrameId>,
    last_position: f64,
    frames_persisted: u64,
    frames_skipped: u64,
}

impl ActiveSession {
    /// `1 - remaining / total`, clamped to `[0, 1]`.
    fn progress_at(&self, position: f64) -> f64 {
        progress_fraction(self.start_position, self.target_position, position)
    }

    fn in_settle_window(&self, position: f64) -> bool {
        position < self.settle_boundary
    }
}

fn progress_fraction(start: f64, target: f64, position: f64) -> f64 {
    let total = target - start;
    if total <= 0.0 {
        return 1.0;
    }
    (1.0 - (target - position) / total).clamp(0.0, 1.0)
}

/// Correlates stage angle with frame arrival and persists the sweep.
///
/// One session at a time. All methods run on the owner's thread; the only
/// cross-thread traffic is the frame queue filled by the camera callback.
pub struct CaptureSequencer {
    source: Box<dyn FrameSource>,
    stage: Box<dyn StageController>,
    persister: Box<dyn FramePersister>,
    progress: Box<dyn ProgressSink>,
    session: Option<ActiveSession>,
    fraction: f64,
    last_summary: Option<SessionSummary>,
}

impl CaptureSequencer {
    pub fn new(
        source: impl FrameSource + 'static,
        stage: impl StageController + 'static,
        persister: impl FramePersister + 'static,
        progress: impl ProgressSink + 'static,
    ) -> Self {
        Self::from_boxed(
            Box::new(source),
            Box::new(stage),
            Box::new(persister),
            Box::new(progress),
        )
    }

    pub fn from_boxed(
        source: Box<dyn FrameSource>,
        stage: Box<dyn StageController>,
        persister: Box<dyn FramePersister>,
        progress: Box<dyn ProgressSink>,
    ) -> Self {
        Self {
            source,
            stage,
            persister,
            progress,
            session: None,
            fraction: 0.0,
            last_summary: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Last progress fraction reported.
    pub fn progress(&self) -> f64 {
        self.fraction
    }

    /// Summary of the most recently ended session.
    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Start a session: set the stage moving and begin accepting frames.
    ///
    /// Configuration problems (no ROI, bad sweep, un-creatable output
    /// directory) fail with [`ScanError::Config`] before the hardware is
    /// touched.
    pub fn start(&mut self, config: SessionConfig) -> ScanResult<()> {
        if self.session.is_some() {
            return Err(ScanError::SessionActive);
        }
        let roi = config.validate()?;

        std::fs::create_dir_all(&config.output_dir).map_err(|e| {
            ScanError::config(format!(
                "Cannot create output directory {}: {e}",
                config.output_dir.display()
            ))
        })?;

        let start_position = self.stage.position()?;
        let target_position = start_position + config.sweep_degrees();

        self.set_velocity(config.velocity)?;
        self.stage
            .set_position(target_position + config.overshoot_degrees)?;

        let (sender, inbox) = frame_channel(config.frame_queue_depth);
        let registered = self.source.register_callback(Box::new(move |frame| {
            sender.post(frame);
        }));
        if let Err(e) = registered {
            if let Err(stop_err) = self.stage.stop() {
                tracing::warn!(error = %stop_err, "Failed to halt stage after camera error");
            }
            return Err(e);
        }

        self.fraction = 0.0;
        self.progress.begin("Capturing");

        tracing::info!(
            output_dir = %config.output_dir.display(),
            start = start_position,
            target = target_position,
            velocity = config.velocity,
            ?roi,
            "Capture session started"
        );

        self.session = Some(ActiveSession {
            roi,
            output_dir: config.output_dir,
            file_extension: config.file_extension,
            settle_policy: config.settle_policy,
            start_position,
            target_position,
            settle_boundary: start_position + config.settle_offset_degrees,
            clock: SessionClock::from_wall(config.started_at),
            inbox,
            last_frame: None,
            last_position: start_position,
            frames_persisted: 0,
            frames_skipped: 0,
        });
        Ok(())
    }

    /// Cap the stage at `velocity`, lowering the floor if it sits above it.
    fn set_velocity(&mut self, velocity: f64) -> ScanResult<()> {
        if self.stage.min_velocity()? > velocity {
            self.stage.set_min_velocity(velocity)?;
        }
        self.stage.set_max_velocity(velocity)
    }

    /// Handle one delivered frame.
    pub fn on_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let Some(session) = self.session.as_mut() else {
            return FrameOutcome::Inactive;
        };
        if session.last_frame == Some(frame.id()) {
            tracing::trace!(frame = %frame.id(), "Duplicate frame ignored");
            return FrameOutcome::Duplicate;
        }
        session.last_frame = Some(frame.id());

        let position = match self.stage.position() {
            Ok(position) => position,
            Err(e) => {
                tracing::warn!(error = %e, "Stage position unavailable, stopping capture");
                self.finish(StopReason::Failed(e.to_string()));
                return FrameOutcome::Aborted;
            }
        };
        session.last_position = position;

        let fraction = session.progress_at(position);
        self.fraction = fraction;
        let cancel = self.progress.report(fraction);

        let elapsed = session.clock.elapsed_for(frame.timestamp());
        let outcome = if session.settle_policy == SettlePolicy::Discard
            && session.in_settle_window(position)
        {
            tracing::trace!(frame = %frame.id(), position, "Settle frame discarded");
            FrameOutcome::Settling
        } else {
            persist_frame(session, self.persister.as_mut(), frame, elapsed, position)
        };

        if cancel {
            self.finish(StopReason::Cancelled);
        } else if position >= session.target_position {
            self.finish(StopReason::Completed);
        }
        outcome
    }

    /// End the session at the operator's request. Safe to call when idle.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        self.finish(StopReason::Requested)
    }

    /// Process every queued frame without blocking. Returns the number of
    /// frames handled. A camera that has gone away fails the session.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.next_queued(None) {
                Some(Delivery::Frame(frame)) => {
                    self.on_frame(&frame);
                    handled += 1;
                }
                Some(Delivery::Disconnected) => {
                    self.source_lost();
                    break;
                }
                Some(Delivery::Empty) | None => break,
            }
        }
        handled
    }

    /// Process frames until the session ends.
    ///
    /// Waits at most `poll` for each frame. When none arrives the progress
    /// sink is still consulted, so a cancel is honoured while the camera is
    /// silent. A camera that has gone away fails the session.
    pub fn run(&mut self, poll: Duration) -> Option<SessionSummary> {
        while let Some(delivery) = self.next_queued(Some(poll)) {
            match delivery {
                Delivery::Frame(frame) => {
                    self.on_frame(&frame);
                }
                Delivery::Empty => {
                    if self.progress.report(self.fraction) {
                        self.finish(StopReason::Cancelled);
                    }
                }
                Delivery::Disconnected => self.source_lost(),
            }
        }
        self.last_summary.clone()
    }

    /// `None` once no session is running.
    fn next_queued(&self, wait: Option<Duration>) -> Option<Delivery> {
        let inbox = &self.session.as_ref()?.inbox;
        Some(match wait {
            Some(timeout) => inbox.next_timeout(timeout),
            None => inbox.try_next(),
        })
    }

    fn source_lost(&mut self) {
        tracing::warn!("Frame source disconnected, stopping capture");
        self.finish(StopReason::Failed(SOURCE_DISCONNECTED.to_string()));
    }

    fn finish(&mut self, reason: StopReason) -> Option<SessionSummary> {
        let session = self.session.take()?;

        if let Err(e) = self.source.unregister_callback() {
            tracing::warn!(error = %e, "Failed to unregister frame callback");
        }
        if let Err(e) = self.stage.stop() {
            tracing::warn!(error = %e, "Failed to halt stage");
        }
        self.progress.finish();

        let summary = SessionSummary {
            output_dir: session.output_dir,
            started_at: session.clock.started_at(),
            start_position: session.start_position,
            target_position: session.target_position,
            final_position: session.last_position,
            frames_persisted: session.frames_persisted,
            frames_skipped: session.frames_skipped,
            frames_dropped: session.inbox.dropped(),
            progress: self.fraction,
            duration_secs: session.clock.wall_elapsed_secs(),
            reason,
        };
        tracing::info!(
            reason = ?summary.reason,
            persisted = summary.frames_persisted,
            skipped = summary.frames_skipped,
            dropped = summary.frames_dropped,
            position = summary.final_position,
            "Capture session ended"
        );

        self.last_summary = Some(summary.clone());
        Some(summary)
    }
}

impl Drop for CaptureSequencer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn persist_frame(
    session: &mut ActiveSession,
    persister: &mut dyn FramePersister,
    frame: &Frame,
    elapsed: f64,
    position: f64,
) -> FrameOutcome {
    let Some(cropped) = frame.crop(&session.roi) else {
        session.frames_skipped += 1;
        let err = ScanError::transient(format!("ROI lies outside frame {}", frame.id()));
        tracing::warn!(error = %err, "Frame skipped");
        return FrameOutcome::Skipped {
            reason: err.to_string(),
        };
    };

    let path = frame_path(&session.output_dir, elapsed, position, &session.file_extension);
    match persister.save(&path, &cropped) {
        Ok(()) => {
            session.frames_persisted += 1;
            tracing::debug!(frame = %frame.id(), elapsed, position, "Frame captured");
            FrameOutcome::Persisted { path }
        }
        Err(e) => {
            session.frames_skipped += 1;
            tracing::warn!(error = %e, frame = %frame.id(), "Frame skipped");
            FrameOutcome::Skipped {
                reason: e.to_string(),
            }
        }
    }
}
