//! Recording state management
//!
//! Defines the recording state machine, session tracking and the status
//! reports handed back to the control surface.

use super::error::RecorderError;
use crate::capture::Frame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    Idle,
    /// Currently recording
    Recording,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Information about the active recording
///
/// Path, dimensions and frame rate are fixed when the session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Capture run that records this session
    pub generation: u64,

    pub camera_index: u32,

    pub output_path: PathBuf,

    pub frame_width: u32,

    pub frame_height: u32,

    pub frame_rate: u32,

    /// Preview mirroring requested at start; `set_mirror` may change it later
    pub mirror_preview: bool,

    pub started_at: DateTime<Utc>,
}

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// The device stopped delivering frames
    DeviceEnded,
    /// Writing to the output failed
    EncoderFailed,
}

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Recording started
    Started { path: PathBuf },
    /// Recording stopped and resources were released
    Stopped {
        path: PathBuf,
        frames: u64,
        reason: StopReason,
    },
    /// Error occurred
    Error(String),
}

/// A display copy of a captured frame plus the current status line
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub frame: Frame,
    pub status: String,
}

/// Outcome of a start/stop request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum StatusReport {
    Started { path: PathBuf },
    AlreadyRecording { path: PathBuf },
    Saved { path: PathBuf, frames: u64 },
    NotRecording,
    #[serde(rename_all = "camelCase")]
    Previewing { camera_index: u32 },
    PreviewStopped,
    NotPreviewing,
    Failed { code: &'static str, message: String },
}

impl StatusReport {
    pub fn failed(error: &RecorderError) -> Self {
        StatusReport::Failed {
            code: error.code(),
            message: error.to_string(),
        }
    }

    /// Output path the report refers to, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            StatusReport::Started { path }
            | StatusReport::AlreadyRecording { path }
            | StatusReport::Saved { path, .. } => Some(path),
            StatusReport::NotRecording
            | StatusReport::Previewing { .. }
            | StatusReport::PreviewStopped
            | StatusReport::NotPreviewing
            | StatusReport::Failed { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            StatusReport::Failed { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StatusReport::Failed { .. })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Started { path } => write!(f, "Recording started → {}", path.display()),
            StatusReport::AlreadyRecording { path } => {
                write!(f, "Already recording → {}", path.display())
            }
            StatusReport::Saved { path, frames } => {
                write!(f, "Saved: {} ({} frames)", path.display(), frames)
            }
            StatusReport::NotRecording => write!(f, "Not recording"),
            StatusReport::Previewing { camera_index } => write!(f, "Previewing camera {}", camera_index),
            StatusReport::PreviewStopped => write!(f, "Preview stopped"),
            StatusReport::NotPreviewing => write!(f, "Not previewing"),
            StatusReport::Failed { message, .. } => write!(f, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        let path = PathBuf::from("VIDEO_MP4/video_2024_05_01_12_00_00.mp4");
        let started = StatusReport::Started { path: path.clone() };
        assert_eq!(
            started.to_string(),
            "Recording started → VIDEO_MP4/video_2024_05_01_12_00_00.mp4"
        );
        assert_eq!(started.path(), Some(path.as_path()));

        let saved = StatusReport::Saved { path, frames: 12 };
        assert!(saved.to_string().ends_with("(12 frames)"));
        assert_eq!(StatusReport::NotRecording.to_string(), "Not recording");
    }

    #[test]
    fn test_preview_reports() {
        let report = StatusReport::Previewing { camera_index: 1 };
        assert_eq!(report.to_string(), "Previewing camera 1");
        assert_eq!(report.path(), None);
        assert!(!report.is_failure());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["type"], "previewing");
        assert_eq!(json["cameraIndex"], 1);

        assert_eq!(StatusReport::PreviewStopped.to_string(), "Preview stopped");
        assert_eq!(StatusReport::NotPreviewing.to_string(), "Not previewing");
    }

    #[test]
    fn test_failed_report_carries_code() {
        let report = StatusReport::failed(&RecorderError::EncoderInitFailure("disk".to_string()));
        assert!(report.is_failure());
        assert_eq!(report.error_code(), Some("ENCODER_INIT_FAILURE"));
        assert_eq!(report.path(), None);
        assert!(report.to_string().contains("disk"));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&RecordingState::Recording).unwrap();
        assert_eq!(json, "\"recording\"");
        assert_eq!(RecordingState::default(), RecordingState::Idle);
    }
}
