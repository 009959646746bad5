//! Live preview pacing and per-frame feedback.
//!
//! The host calls [`LivePreview::should_tick`] from its timer. On a tick it
//! hands over the newest frame, which is scored for focus and shrunk to
//! display size. A frame already shown is skipped, so a camera slower than
//! the tick rate costs nothing extra.

use std::time::{Duration, Instant};

use turnscan_common::clock::RateController;
use turnscan_common::config::PreviewDefaults;
use turnscan_processing_core::focus::{FocusSample, FocusScorer};
use turnscan_scan_model::frame::{Frame, FrameId};
use turnscan_scan_model::geometry::Rect;

const FPS_WINDOW_NS: u64 = 1_000_000_000;

/// Output of one preview tick.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    /// The frame at display scale.
    pub display: Frame,
    pub sample: FocusSample,
}

/// Min/max/mean of per-frame processing time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingStats {
    count: u64,
    min: Option<Duration>,
    max: Duration,
    total: Duration,
}

impl TimingStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.min = Some(self.min.map_or(elapsed, |min| min.min(elapsed)));
        self.max = self.max.max(elapsed);
        self.total += elapsed;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    pub fn max(&self) -> Option<Duration> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<Duration> {
        let count = u32::try_from(self.count).ok().filter(|c| *c > 0)?;
        Some(self.total / count)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Preview loop state owned by the UI thread.
#[derive(Debug)]
pub struct LivePreview {
    scorer: FocusScorer,
    display_scale: f64,
    tick: RateController,
    live: bool,
    last_frame: Option<FrameId>,
    last_sample: Option<FocusSample>,
    timings: TimingStats,
    window_start_ns: Option<u64>,
    frames_in_window: u32,
    fps: Option<u32>,
}

impl LivePreview {
    pub fn new(preview: &PreviewDefaults, scorer: FocusScorer) -> Self {
        Self {
            scorer,
            display_scale: preview.display_scale,
            tick: RateController::from_interval_ms(preview.frame_interval_ms),
            live: false,
            last_frame: None,
            last_sample: None,
            timings: TimingStats::default(),
            window_start_ns: None,
            frames_in_window: 0,
            fps: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Start or stop the preview. Stopping logs the timing summary of the
    /// run that just ended.
    pub fn set_live(&mut self, live: bool) {
        if live == self.live {
            return;
        }
        self.live = live;

        if live {
            self.tick.reset();
            self.timings.reset();
            self.last_frame = None;
            self.window_start_ns = None;
            self.frames_in_window = 0;
            self.fps = None;
            tracing::info!(
                interval_ms = self.tick.interval_ns() / 1_000_000,
                "Live preview started"
            );
        } else {
            tracing::info!(
                frames = self.timings.count(),
                min_ms = self.timings.min().map(|d| d.as_secs_f64() * 1000.0),
                max_ms = self.timings.max().map(|d| d.as_secs_f64() * 1000.0),
                mean_ms = self.timings.mean().map(|d| d.as_secs_f64() * 1000.0),
                "Live preview stopped"
            );
        }
    }

    /// Whether the host should refresh the preview now.
    pub fn should_tick(&mut self, now_ns: u64) -> bool {
        self.live && self.tick.should_tick(now_ns)
    }

    /// Score and shrink `frame` for display.
    ///
    /// Returns `None` while stopped or when `frame` is the one already
    /// shown. `roi` is in source coordinates.
    pub fn process(&mut self, frame: &Frame, roi: Option<&Rect>) -> Option<PreviewFrame> {
        if !self.live || self.last_frame == Some(frame.id()) {
            return None;
        }

        let started = Instant::now();
        let sample = self.scorer.sample(frame, roi);
        let display = frame.downscale(self.display_scale);
        self.timings.record(started.elapsed());

        self.last_frame = Some(frame.id());
        self.last_sample = Some(sample);
        self.frames_in_window += 1;
        tracing::trace!(frame = %sample.frame, score = sample.score, "Preview frame");

        Some(PreviewFrame { display, sample })
    }

    /// Close the fps window once a second has passed since it opened.
    /// Returns the number of frames shown in the window that just closed.
    pub fn fps_tick(&mut self, now_ns: u64) -> Option<u32> {
        let start = *self.window_start_ns.get_or_insert(now_ns);
        if now_ns < start + FPS_WINDOW_NS {
            return None;
        }

        let fps = self.frames_in_window;
        self.frames_in_window = 0;
        self.window_start_ns = Some(now_ns);
        self.fps = Some(fps);
        tracing::debug!(fps, "Preview rate");
        Some(fps)
    }

    /// Frames shown during the last complete one-second window.
    pub fn fps(&self) -> Option<u32> {
        self.fps
    }

    pub fn last_sample(&self) -> Option<FocusSample> {
        self.last_sample
    }

    pub fn timings(&self) -> &TimingStats {
        &self.timings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnscan_scan_model::frame::PixelFormat;

    const MS: u64 = 1_000_000;

    fn checker(id: u64) -> Frame {
        let data: Vec<u8> = (0..64u32)
            .flat_map(|y| (0..64u32).map(move |x| if (x / 4 + y / 4) % 2 == 0 { 255 } else { 0 }))
            .collect();
        Frame::packed(FrameId(id), data, 64, 64, PixelFormat::Mono8, id as f64).unwrap()
    }

    fn preview() -> LivePreview {
        LivePreview::new(&PreviewDefaults::default(), FocusScorer::new(1.0))
    }

    #[test]
    fn test_ticks_only_while_live() {
        let mut live = preview();
        assert!(!live.should_tick(0));
        live.set_live(true);
        assert!(live.should_tick(0));
        assert!(!live.should_tick(20 * MS));
        assert!(live.should_tick(50 * MS));
    }

    #[test]
    fn test_process_skips_repeated_frame() {
        let mut live = preview();
        live.set_live(true);
        let frame = checker(3);

        let shown = live.process(&frame, None).unwrap();
        assert_eq!(shown.sample.frame, FrameId(3));
        assert!(shown.sample.score > 0.0);
        assert!(live.process(&frame, None).is_none());
        assert!(live.process(&checker(4), None).is_some());
        assert_eq!(live.timings().count(), 2);
    }

    #[test]
    fn test_process_downscales_for_display() {
        let mut live = preview();
        live.set_live(true);
        let shown = live.process(&checker(1), None).unwrap();
        assert_eq!((shown.display.cols(), shown.display.rows()), (16, 16));
    }

    #[test]
    fn test_process_ignored_when_stopped() {
        let mut live = preview();
        assert!(live.process(&checker(1), None).is_none());
        assert!(live.last_sample().is_none());
    }

    #[test]
    fn test_fps_counts_frames_per_second() {
        let mut live = preview();
        live.set_live(true);
        assert_eq!(live.fps_tick(0), None);
        for id in 0..12 {
            live.process(&checker(id), None);
        }
        assert_eq!(live.fps_tick(500 * MS), None);
        assert_eq!(live.fps_tick(1000 * MS), Some(12));
        assert_eq!(live.fps(), Some(12));
        assert_eq!(live.fps_tick(2000 * MS), Some(0));
    }

    #[test]
    fn test_restart_clears_stats() {
        let mut live = preview();
        live.set_live(true);
        live.process(&checker(1), None);
        live.set_live(false);
        live.set_live(true);
        assert_eq!(live.timings().count(), 0);
        // The same frame may be shown again after a restart.
        assert!(live.process(&checker(1), None).is_some());
    }

    #[test]
    fn test_timing_stats() {
        let mut stats = TimingStats::default();
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.max(), None);
        stats.record(Duration::from_millis(4));
        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(7));
        assert_eq!(stats.min(), Some(Duration::from_millis(4)));
        assert_eq!(stats.max(), Some(Duration::from_millis(10)));
        assert_eq!(stats.mean(), Some(Duration::from_millis(7)));
    }
}
