//! Recording system module
//!
//! This module implements the capture/record state machine:
//! - Shared session state guarded by a single lock
//! - The capture loop that reads, records and previews each frame
//! - SessionController for the preview and start/stop protocol

pub mod capture_loop;
pub mod coordinator;
pub mod error;
pub mod output;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::SessionController;
pub use error::{RecorderError, RecorderResult};
pub use output::{ensure_output_dir, next_output_path};
pub use state::{PreviewFrame, RecordingEvent, RecordingSession, RecordingState, StatusReport, StopReason};
