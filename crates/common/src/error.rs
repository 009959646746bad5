//! Error types shared across Turnscan crates.

use std::path::PathBuf;

/// Top-level error type for Turnscan operations.
///
/// Geometry, focus scoring and ROI selection never fail; these variants
/// cover configuration, hardware and capture problems.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Invalid session or application configuration. Surfaced to the
    /// operator; the session never starts.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No camera detected or stage not discoverable.
    #[error("Hardware unavailable: {message}")]
    HardwareUnavailable { message: String },

    /// A single frame could not be cropped or persisted.
    #[error("Transient capture failure: {message}")]
    TransientCapture { message: String },

    #[error("A capture session is already active")]
    SessionActive,

    #[error("Stage error: {message}")]
    Stage { message: String },

    #[error("Camera error: {message} - {detail}")]
    Camera { message: String, detail: String },

    #[error("Failed to persist frame to {path}: {message}")]
    Persist { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ScanError.
pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn hardware_unavailable(msg: impl Into<String>) -> Self {
        Self::HardwareUnavailable {
            message: msg.into(),
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientCapture {
            message: msg.into(),
        }
    }

    pub fn stage(msg: impl Into<String>) -> Self {
        Self::Stage {
            message: msg.into(),
        }
    }

    /// A camera error with a detailed diagnostic string.
    pub fn camera(msg: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Camera {
            message: msg.into(),
            detail: detail.into(),
        }
    }

    pub fn persist(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Persist {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Whether the failure only affects a single frame and the session
    /// may continue.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientCapture { .. } | Self::Persist { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScanError::transient("crop failed").is_transient());
        assert!(ScanError::persist("/tmp/x.tiff", "disk full").is_transient());
        assert!(!ScanError::config("missing ROI").is_transient());
        assert!(!ScanError::SessionActive.is_transient());
    }

    #[test]
    fn test_camera_error_display_includes_detail() {
        let err = ScanError::camera("No cameras detected", "bus reported 0 devices");
        assert_eq!(
            err.to_string(),
            "Camera error: No cameras detected - bus reported 0 devices"
        );
    }
}
