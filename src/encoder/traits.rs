//! Encoder trait definitions

use crate::capture::{Frame, PixelLayout};
use crate::recorder::RecorderResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters an encoder is bound to for its whole life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Layout of the raw frames handed to the encoder
    pub input_layout: PixelLayout,
}

/// Writes frames of a fixed size into one output file
pub trait FrameEncoder: Send {
    /// Append one frame
    ///
    /// Frames whose size differs from the settings are rejected with
    /// `EncoderWriteFailure`.
    fn write_frame(&mut self, frame: &Frame) -> RecorderResult<()>;

    fn frames_written(&self) -> u64;

    /// Flush and close the output, returning the number of frames written
    ///
    /// Calling it again after a successful finish is a no-op.
    fn finish(&mut self) -> RecorderResult<u64>;
}

/// Creates encoders bound to an output path
pub trait EncoderProvider: Send + Sync {
    fn create(&self, path: &Path, settings: EncoderSettings) -> RecorderResult<Box<dyn FrameEncoder>>;
}
