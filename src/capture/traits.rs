//! Capture trait definitions
//!
//! Platform-agnostic traits for camera sources.

use super::frame::Frame;
use crate::recorder::RecorderResult;
use serde::{Deserialize, Serialize};

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Numeric device index
    pub index: u32,

    /// Device name
    pub name: String,

    /// Backend-specific description
    pub description: String,
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An open camera
///
/// Owned exclusively by the recording session while open.
pub trait CaptureDevice: Send {
    /// Device index this handle was opened with
    fn index(&self) -> u32;

    /// Negotiated frame size, fixed after open
    fn dimensions(&self) -> Resolution;

    /// Block until the next frame is available
    ///
    /// Fails with `ReadFailure` once the device is closed, disconnected or
    /// out of frames. There is no internal timeout.
    fn read_frame(&mut self) -> RecorderResult<Frame>;

    /// Release the native resource. Closing twice is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens camera devices by index
pub trait DeviceProvider: Send + Sync {
    /// Acquire the camera at `index`
    ///
    /// Fails with `DeviceUnavailable` when the device cannot be opened or
    /// does not deliver a probe frame.
    fn open(&self, index: u32) -> RecorderResult<Box<dyn CaptureDevice>>;
}
