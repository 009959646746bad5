//! End-to-end sequencer behaviour against scripted hardware.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use turnscan_capture_engine::sequencer::SOURCE_DISCONNECTED;
use turnscan_capture_engine::{
    CaptureSequencer, FrameCallback, FrameOutcome, FramePersister, FrameSource, SessionConfig,
    SharedProgress, StageController, StopReason, TiffPersister,
};
use turnscan_common::config::{CaptureDefaults, SettlePolicy};
use turnscan_common::error::{ScanError, ScanResult};
use turnscan_scan_model::frame::{Frame, FrameId, PixelFormat};
use turnscan_scan_model::geometry::Rect;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct FakeCamera {
    callback: Arc<Mutex<Option<FrameCallback>>>,
    fail_register: bool,
}

impl FakeCamera {
    fn deliver(&self, frame: Frame) {
        if let Some(callback) = lock(&self.callback).as_ref() {
            callback(frame);
        }
    }

    /// Lose the callback the way a crashed driver thread would, without
    /// the sequencer asking.
    fn disconnect(&self) {
        lock(&self.callback).take();
    }

    fn is_registered(&self) -> bool {
        lock(&self.callback).is_some()
    }
}

impl FrameSource for FakeCamera {
    fn register_callback(&mut self, callback: FrameCallback) -> ScanResult<()> {
        if self.fail_register {
            return Err(ScanError::camera("Unable to connect to camera", "test"));
        }
        *lock(&self.callback) = Some(callback);
        Ok(())
    }

    fn unregister_callback(&mut self) -> ScanResult<()> {
        *lock(&self.callback) = None;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StageLog {
    position: f64,
    commanded: Vec<f64>,
    min_velocity: f64,
    max_velocity: f64,
    stops: usize,
    offline: bool,
}

#[derive(Clone, Default)]
struct FakeStage {
    log: Arc<Mutex<StageLog>>,
}

impl FakeStage {
    fn at(position: f64) -> Self {
        let stage = Self::default();
        {
            let mut log = lock(&stage.log);
            log.position = position;
            log.min_velocity = 5.0;
            log.max_velocity = 20.0;
        }
        stage
    }

    fn move_to(&self, position: f64) {
        lock(&self.log).position = position;
    }

    fn go_offline(&self) {
        lock(&self.log).offline = true;
    }

    fn log(&self) -> MutexGuard<'_, StageLog> {
        lock(&self.log)
    }
}

impl StageController for FakeStage {
    fn position(&self) -> ScanResult<f64> {
        let log = lock(&self.log);
        if log.offline {
            return Err(ScanError::stage("controller not responding"));
        }
        Ok(log.position)
    }

    fn set_position(&mut self, degrees: f64) -> ScanResult<()> {
        lock(&self.log).commanded.push(degrees);
        Ok(())
    }

    fn min_velocity(&self) -> ScanResult<f64> {
        Ok(lock(&self.log).min_velocity)
    }

    fn set_min_velocity(&mut self, velocity: f64) -> ScanResult<()> {
        lock(&self.log).min_velocity = velocity;
        Ok(())
    }

    fn max_velocity(&self) -> ScanResult<f64> {
        Ok(lock(&self.log).max_velocity)
    }

    fn set_max_velocity(&mut self, velocity: f64) -> ScanResult<()> {
        lock(&self.log).max_velocity = velocity;
        Ok(())
    }

    fn acceleration(&self) -> ScanResult<f64> {
        Ok(1.0)
    }

    fn stop(&mut self) -> ScanResult<()> {
        lock(&self.log).stops += 1;
        Ok(())
    }
}

/// Records file names and the size of each saved crop.
#[derive(Clone, Default)]
struct RecordingPersister {
    saved: Arc<Mutex<Vec<(String, u32, u32)>>>,
    fail_names: Arc<Mutex<HashSet<String>>>,
}

impl RecordingPersister {
    fn names(&self) -> Vec<String> {
        lock(&self.saved).iter().map(|(n, _, _)| n.clone()).collect()
    }

    fn fail_on(&self, name: &str) {
        lock(&self.fail_names).insert(name.to_string());
    }
}

impl FramePersister for RecordingPersister {
    fn save(&mut self, path: &Path, frame: &Frame) -> ScanResult<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if lock(&self.fail_names).contains(&name) {
            return Err(ScanError::persist(path, "disk full"));
        }
        lock(&self.saved).push((name, frame.cols(), frame.rows()));
        Ok(())
    }
}

struct Rig {
    camera: FakeCamera,
    stage: FakeStage,
    persister: RecordingPersister,
    progress: SharedProgress,
    sequencer: CaptureSequencer,
}

fn rig_at(position: f64) -> Rig {
    let camera = FakeCamera::default();
    let stage = FakeStage::at(position);
    let persister = RecordingPersister::default();
    let progress = SharedProgress::new();
    let sequencer = CaptureSequencer::new(
        camera.clone(),
        stage.clone(),
        persister.clone(),
        progress.clone(),
    );
    Rig {
        camera,
        stage,
        persister,
        progress,
        sequencer,
    }
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("turnscan-test-{}-{name}", std::process::id()))
}

fn session(name: &str) -> SessionConfig {
    let mut config = SessionConfig::from_defaults(
        &CaptureDefaults::default(),
        Some(Rect::new(0.0, 0.0, 800.0, 600.0)),
        temp_dir(name),
    );
    config.target_rotation_degrees = 360.0;
    config.settle_offset_degrees = 10.0;
    config.velocity = 2.0;
    config
}

fn frame(id: u64, timestamp: f64) -> Frame {
    Frame::packed(
        FrameId(id),
        vec![128u8; 1000 * 700],
        700,
        1000,
        PixelFormat::Mono8,
        timestamp,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_full_sweep_names_frames_and_completes() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("sweep")).unwrap();
    assert!(rig.sequencer.is_active());
    assert!(rig.camera.is_registered());
    assert!(rig.progress.is_active());

    for (id, (position, timestamp)) in [(10.0, 0.0), (50.0, 1.0), (200.0, 2.0), (381.0, 3.0)]
        .into_iter()
        .enumerate()
    {
        assert!(rig.sequencer.is_active());
        rig.stage.move_to(position);
        let outcome = rig.sequencer.on_frame(&frame(id as u64, timestamp));
        assert!(matches!(outcome, FrameOutcome::Persisted { .. }), "{outcome:?}");
    }

    assert_eq!(
        rig.persister.names(),
        vec!["0_10.tiff", "1_50.tiff", "2_200.tiff", "3_381.tiff"]
    );
    assert!(!rig.sequencer.is_active());
    assert!(!rig.camera.is_registered());
    assert!(!rig.progress.is_active());
    assert_eq!(rig.sequencer.progress(), 1.0);

    let summary = rig.sequencer.last_summary().unwrap();
    assert_eq!(summary.reason, StopReason::Completed);
    assert_eq!(summary.frames_persisted, 4);
    assert_eq!(summary.target_position, 380.0);
    assert_eq!(summary.final_position, 381.0);

    // Frames after completion are ignored.
    assert_eq!(
        rig.sequencer.on_frame(&frame(9, 4.0)),
        FrameOutcome::Inactive
    );
    std::fs::remove_dir_all(temp_dir("sweep")).ok();
}

#[test]
fn test_completes_exactly_at_target() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("boundary")).unwrap();

    rig.stage.move_to(379.9);
    rig.sequencer.on_frame(&frame(0, 0.0));
    assert!(rig.sequencer.is_active());
    assert!(rig.sequencer.progress() < 1.0);

    rig.stage.move_to(380.0);
    let outcome = rig.sequencer.on_frame(&frame(1, 1.0));
    assert!(matches!(outcome, FrameOutcome::Persisted { .. }), "{outcome:?}");
    assert!(!rig.sequencer.is_active());
    assert_eq!(rig.persister.names(), vec!["0_379.9.tiff", "1_380.tiff"]);
    assert_eq!(
        rig.sequencer.last_summary().map(|s| s.reason.clone()),
        Some(StopReason::Completed)
    );
    std::fs::remove_dir_all(temp_dir("boundary")).ok();
}

#[test]
fn test_start_commands_stage_past_target() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("command")).unwrap();
    {
        let log = rig.stage.log();
        assert_eq!(log.commanded, vec![381.0]);
        assert_eq!(log.max_velocity, 2.0);
        // The floor was above the requested velocity and had to come down.
        assert_eq!(log.min_velocity, 2.0);
    }
    assert!(temp_dir("command").is_dir());
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("command")).ok();
}

#[test]
fn test_crops_to_roi() {
    let mut rig = rig_at(0.0);
    let mut config = session("crop");
    config.roi = Some(Rect::new(100.0, 50.0, 64.0, 32.0));
    rig.sequencer.start(config).unwrap();
    rig.sequencer.on_frame(&frame(0, 0.0));
    assert_eq!(lock(&rig.persister.saved)[0].1, 64);
    assert_eq!(lock(&rig.persister.saved)[0].2, 32);
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("crop")).ok();
}

#[test]
fn test_duplicate_frame_is_ignored() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("dup")).unwrap();
    rig.stage.move_to(20.0);
    let first = frame(5, 0.0);
    assert!(matches!(
        rig.sequencer.on_frame(&first),
        FrameOutcome::Persisted { .. }
    ));
    rig.stage.move_to(21.0);
    assert_eq!(rig.sequencer.on_frame(&first), FrameOutcome::Duplicate);
    assert_eq!(rig.persister.names(), vec!["0_20.tiff"]);
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("dup")).ok();
}

#[test]
fn test_cancel_stops_after_current_frame() {
    let mut rig = rig_at(0.0);
    rig.sequencer.start(session("cancel")).unwrap();
    rig.stage.move_to(30.0);
    rig.sequencer.on_frame(&frame(0, 0.0));

    rig.progress.cancel();
    rig.stage.move_to(40.0);
    rig.sequencer.on_frame(&frame(1, 0.5));

    assert!(!rig.sequencer.is_active());
    assert_eq!(rig.persister.names(), vec!["0_30.tiff", "0.5_40.tiff"]);
    assert_eq!(
        rig.sequencer.last_summary().map(|s| s.reason.clone()),
        Some(StopReason::Cancelled)
    );
    // The cancel request is cleared for the next session.
    assert!(!rig.progress.is_cancelled());
    assert!(rig.stage.log().stops >= 1);
    std::fs::remove_dir_all(temp_dir("cancel")).ok();
}

#[test]
fn test_missing_roi_fails_without_touching_hardware() {
    let mut rig = rig_at(0.0);
    let mut config = session("no-roi");
    config.roi = None;
    let err = rig.sequencer.start(config).unwrap_err();
    assert!(matches!(err, ScanError::Config { .. }));
    assert!(!rig.sequencer.is_active());
    assert!(rig.stage.log().commanded.is_empty());
    assert!(!rig.camera.is_registered());
}

#[test]
fn test_uncreatable_output_dir_is_config_error() {
    let blocker = temp_dir("blocker-file");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let mut rig = rig_at(0.0);
    let mut config = session("unused");
    config.output_dir = blocker.join("nested");
    let err = rig.sequencer.start(config).unwrap_err();
    assert!(matches!(err, ScanError::Config { .. }));
    assert!(!rig.sequencer.is_active());
    std::fs::remove_file(&blocker).ok();
}

#[test]
fn test_second_start_is_rejected() {
    let mut rig = rig_at(0.0);
    rig.sequencer.start(session("twice")).unwrap();
    let err = rig.sequencer.start(session("twice")).unwrap_err();
    assert!(matches!(err, ScanError::SessionActive));
    assert!(rig.sequencer.is_active());
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("twice")).ok();
}

#[test]
fn test_stop_is_idempotent() {
    let mut rig = rig_at(0.0);
    assert!(rig.sequencer.stop().is_none());

    let config = session("stop");
    let started_at = config.started_at;
    rig.sequencer.start(config).unwrap();
    let summary = rig.sequencer.stop().unwrap();
    assert_eq!(summary.reason, StopReason::Requested);
    assert_eq!(summary.started_at, started_at);
    assert!(rig.sequencer.stop().is_none());
    assert_eq!(rig.stage.log().stops, 1);
    assert!(!rig.camera.is_registered());
    std::fs::remove_dir_all(temp_dir("stop")).ok();
}

#[test]
fn test_camera_failure_halts_stage() {
    let camera = FakeCamera {
        fail_register: true,
        ..FakeCamera::default()
    };
    let stage = FakeStage::at(0.0);
    let mut sequencer = CaptureSequencer::new(
        camera,
        stage.clone(),
        RecordingPersister::default(),
        SharedProgress::new(),
    );
    let err = sequencer.start(session("camera-fail")).unwrap_err();
    assert!(matches!(err, ScanError::Camera { .. }));
    assert!(!sequencer.is_active());
    assert_eq!(stage.log().stops, 1);
    std::fs::remove_dir_all(temp_dir("camera-fail")).ok();
}

#[test]
fn test_stage_failure_stops_session() {
    let mut rig = rig_at(0.0);
    rig.sequencer.start(session("stage-fail")).unwrap();
    rig.stage.go_offline();
    assert_eq!(
        rig.sequencer.on_frame(&frame(0, 0.0)),
        FrameOutcome::Aborted
    );
    assert!(!rig.sequencer.is_active());
    assert!(matches!(
        rig.sequencer.last_summary().map(|s| &s.reason),
        Some(StopReason::Failed(_))
    ));
    std::fs::remove_dir_all(temp_dir("stage-fail")).ok();
}

#[test]
fn test_persist_failure_skips_frame_only() {
    let mut rig = rig_at(0.0);
    rig.sequencer.start(session("persist-fail")).unwrap();
    rig.persister.fail_on("1_20.tiff");

    rig.stage.move_to(10.0);
    rig.sequencer.on_frame(&frame(0, 0.0));
    rig.stage.move_to(20.0);
    let outcome = rig.sequencer.on_frame(&frame(1, 1.0));
    assert!(matches!(outcome, FrameOutcome::Skipped { .. }));
    rig.stage.move_to(30.0);
    rig.sequencer.on_frame(&frame(2, 2.0));

    assert!(rig.sequencer.is_active());
    assert_eq!(rig.persister.names(), vec!["0_10.tiff", "2_30.tiff"]);
    let summary = rig.sequencer.stop().unwrap();
    assert_eq!(summary.frames_persisted, 2);
    assert_eq!(summary.frames_skipped, 1);
    std::fs::remove_dir_all(temp_dir("persist-fail")).ok();
}

#[test]
fn test_roi_outside_frame_skips() {
    let mut rig = rig_at(0.0);
    let mut config = session("roi-outside");
    config.roi = Some(Rect::new(5000.0, 5000.0, 10.0, 10.0));
    rig.sequencer.start(config).unwrap();
    let outcome = rig.sequencer.on_frame(&frame(0, 0.0));
    assert!(matches!(outcome, FrameOutcome::Skipped { .. }));
    assert!(rig.sequencer.is_active());
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("roi-outside")).ok();
}

#[test]
fn test_discard_policy_skips_settle_window() {
    let mut rig = rig_at(100.0);
    let mut config = session("settle");
    config.settle_policy = SettlePolicy::Discard;
    rig.sequencer.start(config).unwrap();

    rig.stage.move_to(105.0);
    assert_eq!(
        rig.sequencer.on_frame(&frame(0, 0.0)),
        FrameOutcome::Settling
    );
    rig.stage.move_to(110.0);
    rig.sequencer.on_frame(&frame(1, 2.5));

    // Elapsed time still counts from the first frame of the session.
    assert_eq!(rig.persister.names(), vec!["2.5_110.tiff"]);
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("settle")).ok();
}

#[test]
fn test_progress_is_reported_per_frame() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("progress")).unwrap();
    rig.stage.move_to(195.0);
    rig.sequencer.on_frame(&frame(0, 0.0));
    assert!((rig.progress.fraction() - 0.5).abs() < 1e-12);

    // Backwards motion may lower progress; it is never negative.
    rig.stage.move_to(5.0);
    rig.sequencer.on_frame(&frame(1, 1.0));
    assert_eq!(rig.progress.fraction(), 0.0);
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("progress")).ok();
}

#[test]
fn test_pump_drains_delivered_frames() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("pump")).unwrap();

    rig.stage.move_to(50.0);
    rig.camera.deliver(frame(0, 10.0));
    rig.camera.deliver(frame(0, 10.0));
    rig.camera.deliver(frame(1, 10.5));
    assert_eq!(rig.sequencer.pump(), 3);

    // Both queued frames read the stage after delivery, so both see 50.
    assert_eq!(rig.persister.names(), vec!["0_50.tiff", "0.5_50.tiff"]);
    assert_eq!(rig.sequencer.pump(), 0);
    rig.sequencer.stop();
    std::fs::remove_dir_all(temp_dir("pump")).ok();
}

#[test]
fn test_run_returns_on_cancel_without_frames() {
    let mut rig = rig_at(0.0);
    rig.sequencer.start(session("run")).unwrap();
    rig.progress.cancel();
    let summary = rig.sequencer.run(Duration::from_millis(5)).unwrap();
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(summary.frames_persisted, 0);
    std::fs::remove_dir_all(temp_dir("run")).ok();
}

#[test]
fn test_run_fails_session_when_camera_disconnects() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("run-disconnect")).unwrap();

    rig.stage.move_to(50.0);
    rig.camera.deliver(frame(0, 0.0));
    rig.camera.disconnect();

    let started = std::time::Instant::now();
    let summary = rig.sequencer.run(Duration::from_secs(5)).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    // Frames queued before the disconnect are still written.
    assert_eq!(rig.persister.names(), vec!["0_50.tiff"]);
    assert_eq!(
        summary.reason,
        StopReason::Failed(SOURCE_DISCONNECTED.to_string())
    );
    assert!(!rig.sequencer.is_active());
    assert_eq!(rig.stage.log().stops, 1);
    assert!(!rig.progress.is_active());
    std::fs::remove_dir_all(temp_dir("run-disconnect")).ok();
}

#[test]
fn test_pump_fails_session_when_camera_disconnects() {
    let mut rig = rig_at(10.0);
    rig.sequencer.start(session("pump-disconnect")).unwrap();
    rig.camera.disconnect();

    assert_eq!(rig.sequencer.pump(), 0);
    assert!(!rig.sequencer.is_active());
    assert!(matches!(
        rig.sequencer.last_summary().map(|s| &s.reason),
        Some(StopReason::Failed(_))
    ));
    std::fs::remove_dir_all(temp_dir("pump-disconnect")).ok();
}

#[test]
fn test_tiff_files_written_to_session_dir() {
    let dir = temp_dir("tiff");
    let camera = FakeCamera::default();
    let stage = FakeStage::at(0.0);
    let mut sequencer =
        CaptureSequencer::new(camera, stage.clone(), TiffPersister::new(), SharedProgress::new());

    let mut config = session("tiff");
    config.roi = Some(Rect::new(10.0, 10.0, 40.0, 30.0));
    config.target_rotation_degrees = 20.0;
    config.settle_offset_degrees = 0.0;
    sequencer.start(config).unwrap();

    stage.move_to(0.0);
    sequencer.on_frame(&frame(0, 100.0));
    stage.move_to(20.0);
    sequencer.on_frame(&frame(1, 101.25));
    assert!(!sequencer.is_active());

    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["0_0.tiff", "1.25_20.tiff"]);

    let image = image::open(dir.join("1.25_20.tiff")).unwrap();
    assert_eq!((image.width(), image.height()), (40, 30));
    std::fs::remove_dir_all(&dir).ok();
}
