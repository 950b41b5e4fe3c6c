//! Error types and handling
//!
//! Common error types used across the application.

use crate::recorder::RecorderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recording error: {0}")]
    Recording(#[from] RecorderError),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Error response for callers that only speak JSON
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Recording(e) => e.code(),
            AppError::Platform(_) => "PLATFORM_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_error_keeps_its_code() {
        let error = AppError::from(RecorderError::DeviceUnavailable("camera 99".to_string()));
        let response = ErrorResponse::from(error);
        assert_eq!(response.code, "DEVICE_UNAVAILABLE");
        assert!(response.message.contains("camera 99"));
    }

    #[test]
    fn test_config_error_code() {
        let response = ErrorResponse::from(AppError::Config("bad frame rate".to_string()));
        assert_eq!(response.code, "CONFIG_ERROR");
    }
}
