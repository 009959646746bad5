//! Turnscan Processing Core
//!
//! Scores frames for sharpness to drive live focus feedback and
//! autofocus-style iteration:
//! - **Focus scoring:** Variance of the Laplacian over an ROI or the whole frame
//! - **Focus window:** Fixed-size scoring patch centred on the operator's ROI
//! - **Autofocus sweep:** Peak detection while stepping a focus control
//!
//! This crate is pure computation with no I/O and no hardware dependencies.
//! All inputs are data; all outputs are data.

pub mod autofocus;
pub mod focus;

pub use autofocus::{FocusPeak, FocusSweep, SweepConfig, SweepStatus};
pub use focus::{focus_window, laplacian_variance, FocusSample, FocusScorer};
