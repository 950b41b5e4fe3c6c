//! Open Webcam Recorder - camera preview and MP4 recording.
//!
//! This is the main library crate. It provides the camera device handle,
//! the ffmpeg encoder, and the session controller that ties them together
//! with a background capture loop.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod recorder;
pub mod utils;

pub use config::{load_config, RecorderConfig};
pub use recorder::{PreviewFrame, RecordingEvent, RecordingState, SessionController, StatusReport};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
