//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ScanResult;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory under which `<seal_name>/raw/...` capture trees live.
    pub captures_dir: PathBuf,

    /// Live preview and ROI selection settings.
    #[serde(default)]
    pub preview: PreviewDefaults,

    /// Default turntable capture settings.
    #[serde(default)]
    pub capture: CaptureDefaults,

    /// Focus scoring settings.
    #[serde(default)]
    pub focus: FocusDefaults,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Live preview parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewDefaults {
    /// Milliseconds between preview ticks; 50 gives around 20 fps.
    pub frame_interval_ms: u64,

    /// Display-to-source scale of the preview image.
    pub display_scale: f64,

    /// Size of the corner/edge hit zone around the selection, in display pixels.
    pub corner_margin: f64,

    /// Preview display size in display pixels.
    pub display_width: f64,
    pub display_height: f64,
}

/// What to do with frames captured while the stage is still inside the
/// settle offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlePolicy {
    /// Persist every frame, including the settle window.
    #[default]
    PersistAll,
    /// Skip frames whose stage position is inside the settle window.
    Discard,
}

/// Default turntable capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDefaults {
    /// Nominal rotation of one scan, in degrees.
    pub target_rotation_degrees: f64,

    /// Extra rotation before the nominal target so the stage reaches
    /// steady velocity.
    pub settle_offset_degrees: f64,

    /// Stage velocity in degrees per second.
    pub velocity: f64,

    /// Degrees commanded beyond the target so the stage's own
    /// motion-complete signal never races session completion.
    pub overshoot_degrees: f64,

    /// Depth of the bounded frame queue between the camera and the sequencer.
    pub frame_queue_depth: usize,

    /// Handling of settle-window frames.
    #[serde(default)]
    pub settle_policy: SettlePolicy,

    /// Extension of persisted frames.
    pub file_extension: String,
}

/// Focus scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusDefaults {
    /// Downscale applied to whole frames before scoring (1.0 = none).
    pub downscale: f64,

    /// Size of the autofocus window centred on the selection.
    pub window_width: f64,
    pub window_height: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "turnscan=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            captures_dir: dirs_default_captures(),
            preview: PreviewDefaults::default(),
            capture: CaptureDefaults::default(),
            focus: FocusDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PreviewDefaults {
    fn default() -> Self {
        Self {
            frame_interval_ms: 50,
            display_scale: 0.25,
            corner_margin: 15.0,
            display_width: 1060.0,
            display_height: 706.0,
        }
    }
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            target_rotation_degrees: 360.0,
            settle_offset_degrees: 10.0,
            velocity: 2.0,
            overshoot_degrees: 1.0,
            frame_queue_depth: 8,
            settle_policy: SettlePolicy::PersistAll,
            file_extension: "tiff".to_string(),
        }
    }
}

impl Default for FocusDefaults {
    fn default() -> Self {
        Self {
            downscale: 0.25,
            window_width: 800.0,
            window_height: 600.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load_from(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                Self::default()
            }
        }
    }

    /// Read config from `path`.
    pub fn load_from(path: &Path) -> ScanResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> ScanResult<()> {
        self.save_to(&config_file_path())
    }

    /// Write config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ScanResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Where the config file is read from.
    pub fn path() -> PathBuf {
        config_file_path()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("turnscan").join("config.json")
}

/// Default captures directory.
fn dirs_default_captures() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("turnscan").join("captures")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;

    #[test]
    fn test_save_then_load_keeps_overrides() {
        let dir = std::env::temp_dir().join(format!("turnscan-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.capture.settle_policy = SettlePolicy::Discard;
        config.capture.velocity = 4.5;

        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.capture.settle_policy, SettlePolicy::Discard);
        assert_eq!(loaded.capture.velocity, 4.5);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_errors_are_classified() {
        let missing = std::env::temp_dir().join("turnscan-no-such-config.json");
        assert!(matches!(
            AppConfig::load_from(&missing),
            Err(ScanError::Io(_))
        ));

        let dir = std::env::temp_dir().join(format!("turnscan-bad-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bad = dir.join("config.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(AppConfig::load_from(&bad), Err(ScanError::Json(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_fills_sections() {
        let json = r#"{ "captures_dir": "/data/scans" }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.captures_dir, PathBuf::from("/data/scans"));
        assert_eq!(config.capture.settle_policy, SettlePolicy::PersistAll);
        assert!((config.preview.display_scale - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_settle_policy_serde_name() {
        let json = serde_json::to_string(&SettlePolicy::Discard).unwrap();
        assert_eq!(json, "\"discard\"");
    }
}
