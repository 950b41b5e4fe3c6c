//! Recording errors
//!
//! Every variant is recovered locally by returning the session to idle with
//! its device and encoder released.

use thiserror::Error;

/// Errors raised by the device, encoder and session controller
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Camera index cannot be opened or yields no frame on probe
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Output file or encoder process cannot be created
    #[error("Encoder init failure: {0}")]
    EncoderInitFailure(String),

    /// Device stopped yielding frames mid-recording
    #[error("Read failure: {0}")]
    ReadFailure(String),

    /// Disk full, broken pipe or codec error while writing
    #[error("Encoder write failure: {0}")]
    EncoderWriteFailure(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecorderError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            RecorderError::EncoderInitFailure(_) => "ENCODER_INIT_FAILURE",
            RecorderError::ReadFailure(_) => "READ_FAILURE",
            RecorderError::EncoderWriteFailure(_) => "ENCODER_WRITE_FAILURE",
            RecorderError::InvalidFrame(_) => "INVALID_FRAME",
            RecorderError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;
