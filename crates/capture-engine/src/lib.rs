//! Turnscan Capture Engine
//!
//! Drives a capture session: the stage rotates the specimen while the
//! camera streams frames, and every frame that arrives during the sweep is
//! cropped to the ROI and written to disk tagged with elapsed time and
//! stage angle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  callback   ┌────────────┐  pump/run   ┌──────────────────┐
//! │ FrameSource  │ ──────────▶ │ FrameInbox │ ──────────▶ │ CaptureSequencer │
//! │ (own thread) │  try_send   │ (bounded)  │             │                  │
//! └──────────────┘             └────────────┘             └───┬─────┬────┬───┘
//!                                          position / stop    │     │    │ report
//!                                   ┌─────────────────┐ ◀─────┘     │    └──▶ ProgressSink
//!                                   │ StageController │             ▼
//!                                   └─────────────────┘      FramePersister
//!                                                    <elapsed>_<position>.tiff
//! ```

pub mod backend;
pub mod inbox;
pub mod persist;
pub mod progress;
pub mod sequencer;

pub use backend::{FrameCallback, FrameSource, StageController};
pub use inbox::{frame_channel, Delivery, FrameInbox, InboxSender};
pub use persist::{FramePersister, TiffPersister};
pub use progress::{LogProgress, ProgressSink, SharedProgress};
pub use sequencer::{
    CaptureSequencer, FrameOutcome, SessionConfig, SessionSummary, StopReason,
};
