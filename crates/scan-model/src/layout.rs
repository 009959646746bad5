//! Capture directory layout and frame file naming.
//!
//! Captures are stored as:
//!
//! ```text
//! <captures_dir>/<seal_name>/raw/<capture_type>/<YYYY_MM_DD_HH_MM>/
//!     0_10.tiff
//!     0.05_10.1.tiff
//!     ...
//! ```
//!
//! Each file name is `<elapsed_seconds>_<stage_position_degrees>.<ext>`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use turnscan_common::error::{ScanError, ScanResult};

/// Lighting setup used for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureType {
    #[serde(rename = "directLED")]
    DirectLed,
    #[serde(rename = "structuredLight")]
    StructuredLight,
}

impl CaptureType {
    /// Directory name used on disk.
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureType::DirectLed => "directLED",
            CaptureType::StructuredLight => "structuredLight",
        }
    }
}

impl std::fmt::Display for CaptureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directLED" | "direct-led" | "direct" => Ok(CaptureType::DirectLed),
            "structuredLight" | "structured-light" | "structured" => {
                Ok(CaptureType::StructuredLight)
            }
            other => Err(ScanError::config(format!(
                "Unknown capture type '{other}' (expected directLED or structuredLight)"
            ))),
        }
    }
}

/// Resolves where one capture session writes its frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureLayout {
    pub root: PathBuf,
    pub seal_name: String,
    pub capture_type: CaptureType,
}

impl CaptureLayout {
    /// Describe a capture tree. The seal name identifies the specimen and
    /// must be a single non-empty path component.
    pub fn new(
        root: impl Into<PathBuf>,
        seal_name: impl Into<String>,
        capture_type: CaptureType,
    ) -> ScanResult<Self> {
        let seal_name = seal_name.into().trim().to_string();
        if seal_name.is_empty() {
            return Err(ScanError::config("A seal name is required"));
        }
        if seal_name.contains(['/', '\\']) || seal_name == "." || seal_name == ".." {
            return Err(ScanError::config(format!(
                "Seal name '{seal_name}' must be a single directory name"
            )));
        }

        Ok(Self {
            root: root.into(),
            seal_name,
            capture_type,
        })
    }

    /// `<root>/<seal_name>/raw/<capture_type>`
    pub fn type_dir(&self) -> PathBuf {
        self.root
            .join(&self.seal_name)
            .join("raw")
            .join(self.capture_type.as_str())
    }

    /// Session directory for a capture started at `started_at`.
    pub fn session_dir<Tz: TimeZone>(&self, started_at: &DateTime<Tz>) -> PathBuf
    where
        Tz::Offset: std::fmt::Display,
    {
        self.type_dir().join(session_dir_name(started_at))
    }
}

/// `YYYY_MM_DD_HH_MM` directory name for a session start time.
pub fn session_dir_name<Tz: TimeZone>(started_at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    started_at.format("%Y_%m_%d_%H_%M").to_string()
}

/// Fractional digits kept in file names (microsecond / micro-degree).
const NAME_SCALE: f64 = 1e6;

/// Shortest decimal form of a number for file names: `0`, `1.25`, `381`.
///
/// Values are rounded to six decimals first so that timestamp differences
/// such as `1000.1 - 1000.0` do not leak float noise into the name.
pub fn format_number(value: f64) -> String {
    let rounded = (value * NAME_SCALE).round() / NAME_SCALE;
    let value = if rounded.is_finite() { rounded } else { value };
    // Adding 0.0 folds -0.0 into 0.0.
    format!("{}", value + 0.0)
}

/// `<elapsed>_<position>.<ext>`
pub fn frame_file_name(elapsed_secs: f64, position_degrees: f64, extension: &str) -> String {
    format!(
        "{}_{}.{}",
        format_number(elapsed_secs),
        format_number(position_degrees),
        extension.trim_start_matches('.')
    )
}

/// Full path of a frame file inside `dir`.
pub fn frame_path(dir: &Path, elapsed_secs: f64, position_degrees: f64, extension: &str) -> PathBuf {
    dir.join(frame_file_name(elapsed_secs, position_degrees, extension))
}

/// Recover `(elapsed_secs, position_degrees)` from a frame file name.
pub fn parse_frame_file_name(name: &str) -> Option<(f64, f64)> {
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    let (elapsed, position) = stem.split_once('_')?;
    Some((elapsed.parse().ok()?, position.parse().ok()?))
}
