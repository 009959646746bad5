//! Turnscan Common Utilities
//!
//! Shared infrastructure for all Turnscan crates:
//! - Error types and result aliases
//! - Clock and rate utilities for preview ticks and session timing
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
