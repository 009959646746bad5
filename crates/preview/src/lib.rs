//! Turnscan Preview
//!
//! The UI-side half of the capture tool. A host windowing layer forwards
//! pointer events and preview ticks here:
//!
//! - **Selector:** Drag/resize state machine for the region of interest
//! - **Handle:** Locked handoff of the current ROI to other threads
//! - **Live:** Preview pacing, per-frame focus scores, fps and timing stats
//!
//! Everything in this crate runs on the single UI thread except
//! [`SelectionHandle`], which is safe to read from the frame-delivery thread.

pub mod live;
pub mod selector;

pub use live::{LivePreview, PreviewFrame, TimingStats};
pub use selector::{CursorShape, RegionSelector, SelectionHandle, SelectionState, SelectorConfig};
