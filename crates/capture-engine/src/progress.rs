//! Progress reporting and operator cancellation.
//!
//! The sequencer reports once per frame. The sink's answer is the only
//! cancellation path, so a UI or signal handler cancels by flipping the
//! flag a [`SharedProgress`] hands back on the next report.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Progress display for a capture session.
pub trait ProgressSink: Send {
    /// Show the progress display with a message.
    fn begin(&mut self, _message: &str) {}

    /// Report completion in `[0, 1]`. Returns `true` if the operator asked
    /// to cancel.
    fn report(&mut self, fraction: f64) -> bool;

    /// Hide the progress display.
    fn finish(&mut self) {}
}

#[derive(Debug, Default)]
struct ProgressState {
    fraction_bits: AtomicU64,
    cancel: AtomicBool,
    active: AtomicBool,
    message: Mutex<String>,
}

/// Lock-free progress cell shared between the sequencer and observers.
/// Clones observe and control the same session.
#[derive(Debug, Clone, Default)]
pub struct SharedProgress {
    state: Arc<ProgressState>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running session to stop at its next frame.
    pub fn cancel(&self) {
        self.state.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.load(Ordering::SeqCst)
    }

    /// Last reported fraction.
    pub fn fraction(&self) -> f64 {
        f64::from_bits(self.state.fraction_bits.load(Ordering::Relaxed))
    }

    /// Whether a session is showing progress.
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn message(&self) -> String {
        self.state
            .message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ProgressSink for SharedProgress {
    fn begin(&mut self, message: &str) {
        *self.state.message.lock().unwrap_or_else(|e| e.into_inner()) = message.to_string();
        self.state.fraction_bits.store(0f64.to_bits(), Ordering::Relaxed);
        self.state.active.store(true, Ordering::SeqCst);
    }

    fn report(&mut self, fraction: f64) -> bool {
        self.state
            .fraction_bits
            .store(fraction.to_bits(), Ordering::Relaxed);
        self.is_cancelled()
    }

    /// Hides the display and clears any pending cancel request.
    fn finish(&mut self) {
        self.state.active.store(false, Ordering::SeqCst);
        self.state.cancel.store(false, Ordering::SeqCst);
    }
}

/// Logs progress at every 10% step, optionally forwarding to another sink
/// that decides cancellation.
pub struct LogProgress {
    inner: Option<Box<dyn ProgressSink>>,
    last_decile: Option<u32>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self {
            inner: None,
            last_decile: None,
        }
    }

    pub fn wrapping(inner: impl ProgressSink + 'static) -> Self {
        Self {
            inner: Some(Box::new(inner)),
            last_decile: None,
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LogProgress {
    fn begin(&mut self, message: &str) {
        self.last_decile = None;
        tracing::info!(%message, "Capture progress");
        if let Some(inner) = self.inner.as_mut() {
            inner.begin(message);
        }
    }

    fn report(&mut self, fraction: f64) -> bool {
        let decile = (fraction.clamp(0.0, 1.0) * 10.0).floor() as u32;
        if self.last_decile != Some(decile) {
            self.last_decile = Some(decile);
            tracing::info!(percent = decile * 10, "Capture progress");
        }
        self.inner
            .as_mut()
            .map(|inner| inner.report(fraction))
            .unwrap_or(false)
    }

    fn finish(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.finish();
        }
    }
}
