//! Clock and timing utilities.
//!
//! Two notions of time matter during a scan:
//! - The camera's capture timestamps, which share an arbitrary epoch that is
//!   only stable within one camera session. A [`SessionClock`] re-anchors
//!   them so the first frame of a capture session is time zero.
//! - Wall-clock time at session start, used to name the capture directory.
//!
//! [`RateController`] gates fixed-period work such as the 20 Hz preview tick.

use chrono::{DateTime, Local};

/// Elapsed-time bookkeeping for one capture session.
#[derive(Debug, Clone)]
pub struct SessionClock {
    /// Wall-clock time the session started.
    started_at: DateTime<Local>,

    /// Capture timestamp of the first frame seen, in seconds.
    epoch_secs: Option<f64>,
}

impl SessionClock {
    /// Create a new session clock anchored to the current wall time.
    pub fn start() -> Self {
        Self::from_wall(Local::now())
    }

    /// Create a clock with a known wall-clock start.
    pub fn from_wall(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            epoch_secs: None,
        }
    }

    /// Seconds between `capture_timestamp` and the first frame of the
    /// session. The first call anchors the epoch and returns zero.
    pub fn elapsed_for(&mut self, capture_timestamp: f64) -> f64 {
        let epoch = *self.epoch_secs.get_or_insert(capture_timestamp);
        // Adding 0.0 folds -0.0 into 0.0 so file names never read "-0".
        (capture_timestamp - epoch) + 0.0
    }

    /// Wall-clock time at session start.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Wall-clock seconds since session start.
    pub fn wall_elapsed_secs(&self) -> f64 {
        let elapsed = Local::now().signed_duration_since(self.started_at);
        elapsed.num_milliseconds() as f64 / 1000.0
    }
}

/// Tick gate for fixed-rate polling.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller that fires every `interval_ms` milliseconds.
    pub fn from_interval_ms(interval_ms: u64) -> Self {
        Self {
            target_interval_ns: interval_ms.max(1) * 1_000_000,
            last_tick_ns: None,
        }
    }

    /// Check if enough time has passed for the next tick.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }

    /// Forget the last tick so the next call fires immediately.
    pub fn reset(&mut self) {
        self.last_tick_ns = None;
    }
}
