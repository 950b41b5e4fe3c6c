//! Camera capture
//!
//! This module provides the device handle contract, frame buffers and the
//! nokhwa-backed webcam implementation.

pub mod frame;
pub mod traits;
pub mod webcam;

pub use frame::{preview_frame, Frame, PixelLayout};
pub use traits::{CameraInfo, CaptureDevice, DeviceProvider, Resolution};
pub use webcam::{list_cameras, probe_camera_indices, WebcamDevice, WebcamProvider};
