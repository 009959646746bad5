//! Bounded handoff of frames from the camera thread to the sequencer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::time::Duration;

use turnscan_scan_model::frame::Frame;

/// Create a frame channel holding at most `depth` undelivered frames.
pub fn frame_channel(depth: usize) -> (InboxSender, FrameInbox) {
    let (tx, rx) = mpsc::sync_channel(depth.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        InboxSender {
            tx,
            dropped: dropped.clone(),
        },
        FrameInbox { rx, dropped },
    )
}

/// Posting half, moved into the camera callback.
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: SyncSender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl InboxSender {
    /// Queue a frame without blocking. A full queue drops the frame.
    /// Returns whether the frame was queued.
    pub fn post(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(frame = %frame.id(), dropped, "Frame queue full, dropping frame");
                false
            }
            // The session ended; late frames are expected.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// What the sequencer found when it checked the inbox.
#[derive(Debug)]
pub enum Delivery {
    Frame(Frame),
    /// Nothing queued yet; the camera is still connected.
    Empty,
    /// The camera dropped its callback and every queued frame was taken.
    Disconnected,
}

impl Delivery {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Delivery::Frame(frame) => Some(frame),
            Delivery::Empty | Delivery::Disconnected => None,
        }
    }
}

/// Receiving half, owned by the sequencer.
#[derive(Debug)]
pub struct FrameInbox {
    rx: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameInbox {
    /// Next queued frame, without waiting.
    pub fn try_next(&self) -> Delivery {
        match self.rx.try_recv() {
            Ok(frame) => Delivery::Frame(frame),
            Err(TryRecvError::Empty) => Delivery::Empty,
            Err(TryRecvError::Disconnected) => Delivery::Disconnected,
        }
    }

    /// Wait up to `timeout` for the next frame.
    pub fn next_timeout(&self, timeout: Duration) -> Delivery {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Delivery::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Delivery::Empty,
            Err(RecvTimeoutError::Disconnected) => Delivery::Disconnected,
        }
    }

    /// Frames dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
