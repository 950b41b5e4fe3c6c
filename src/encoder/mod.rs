//! Video file encoding
//!
//! This module provides the encoder contract, the ffmpeg-backed MPEG-4
//! writer and a probe for inspecting finished recordings.

pub mod ffmpeg;
pub mod probe;
pub mod traits;

pub use ffmpeg::{FfmpegEncoder, FfmpegEncoderProvider};
pub use probe::{probe_video, VideoMetadata};
pub use traits::{EncoderProvider, EncoderSettings, FrameEncoder};
