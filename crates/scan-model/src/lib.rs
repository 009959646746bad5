//! Turnscan Scan Model
//!
//! Defines the core data contracts shared by the preview and capture crates:
//! - **Geometry:** Real-valued rectangles with edge/corner hit-testing
//! - **Frames:** Read-only camera frames with sequence identity
//! - **Layout:** Capture directory structure and frame file naming
//!
//! Coordinates are in pixels of whichever space the caller works in
//! (display or source); conversion is an explicit `scale`.

pub mod frame;
pub mod geometry;
pub mod layout;

pub use frame::*;
pub use geometry::*;
pub use layout::*;
