//! Recorder configuration
//!
//! Loaded from an optional TOML file; every field has a default so a
//! missing file or a partial one is fine.

use crate::capture::PixelLayout;
use crate::utils::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "VIDEO_MP4";
pub const DEFAULT_FRAME_RATE: u32 = 25;

pub const ENV_OUTPUT_DIR: &str = "WEBCAM_RECORDER_OUTPUT_DIR";
pub const ENV_FRAME_RATE: &str = "WEBCAM_RECORDER_FRAME_RATE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Directory recordings are written into
    pub output_dir: PathBuf,

    /// Fixed output frame rate, also the capture pacing target
    pub frame_rate: u32,

    /// Preview frames buffered before new ones are dropped
    pub preview_capacity: usize,

    /// Channel order handed to the preview sink
    pub preview_layout: PixelLayout,

    pub camera_index: u32,

    pub mirror_preview: bool,

    /// Highest camera index (exclusive) tried when probing
    pub probe_limit: u32,

    pub ffmpeg_path: String,

    pub ffprobe_path: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            frame_rate: DEFAULT_FRAME_RATE,
            preview_capacity: 2,
            preview_layout: PixelLayout::Rgba32,
            camera_index: 0,
            mirror_preview: false,
            probe_limit: 5,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=120).contains(&self.frame_rate) {
            return Err(AppError::Config(format!(
                "frame_rate must be between 1 and 120, got {}",
                self.frame_rate
            )));
        }
        if self.preview_capacity == 0 {
            return Err(AppError::Config("preview_capacity must be at least 1".to_string()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(AppError::Config("output_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> AppResult<RecorderConfig> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// `load_config` with environment lookups resolved through `lookup`
pub fn load_config_with_env<F>(path: Option<&Path>, lookup: F) -> AppResult<RecorderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) if path.exists() => {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("Failed to read config: {}", e)))?;
            toml::from_str(&contents).map_err(|e| AppError::Config(format!("Invalid config: {}", e)))?
        }
        Some(path) => {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            RecorderConfig::default()
        }
        None => RecorderConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;

    config.validate()?;
    Ok(config)
}

/// Override config values from environment variables
///
/// `lookup` resolves a variable name; `load_config` passes the process
/// environment.
pub fn apply_env_overrides<F>(config: &mut RecorderConfig, lookup: F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(rate) = lookup(ENV_FRAME_RATE) {
        config.frame_rate = rate
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid {}: {}", ENV_FRAME_RATE, rate)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RecorderConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("VIDEO_MP4"));
        assert_eq!(config.frame_rate, 25);
        assert_eq!(config.preview_layout, PixelLayout::Rgba32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            frame_rate = 30
            mirror_preview = true
            preview_layout = "rgb24"
        "#;
        let config: RecorderConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.frame_rate, 30);
        assert!(config.mirror_preview);
        assert_eq!(config.preview_layout, PixelLayout::Rgb24);
        assert_eq!(config.output_dir, PathBuf::from("VIDEO_MP4"));
        assert_eq!(config.ffmpeg_path, "ffmpeg");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RecorderConfig::default();
        config.frame_rate = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = RecorderConfig::default();
        config.preview_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.toml");
        std::fs::write(&path, "camera_index = 2\nprobe_limit = 3\n").unwrap();

        let config = load_config_with_env(Some(&path), |_| None).unwrap();
        assert_eq!(config.camera_index, 2);
        assert_eq!(config.probe_limit, 3);
    }

    fn lookup_from<'a>(vars: &'a [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_env_overrides_apply() {
        let mut config = RecorderConfig::default();
        let vars = [(ENV_OUTPUT_DIR, "/tmp/clips"), (ENV_FRAME_RATE, " 30 ")];
        apply_env_overrides(&mut config, lookup_from(&vars)).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.frame_rate, 30);
    }

    #[test]
    fn test_env_overrides_absent_keep_values() {
        let mut config = RecorderConfig {
            frame_rate: 12,
            ..RecorderConfig::default()
        };
        apply_env_overrides(&mut config, lookup_from(&[])).unwrap();
        assert_eq!(config.frame_rate, 12);
        assert_eq!(config.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn test_env_rate_is_validated_after_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.toml");
        std::fs::write(&path, "frame_rate = 30\n").unwrap();

        let vars = [(ENV_FRAME_RATE, "500")];
        let result = load_config_with_env(Some(&path), lookup_from(&vars));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("frame_rate")));
    }

    #[test]
    fn test_env_override_bad_frame_rate() {
        let mut config = RecorderConfig::default();
        let vars = [(ENV_FRAME_RATE, "fast")];
        let result = apply_env_overrides(&mut config, lookup_from(&vars));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains(ENV_FRAME_RATE)));
        assert_eq!(config.frame_rate, DEFAULT_FRAME_RATE);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.toml");
        std::fs::write(&path, "frame_rate = \"fast\"").unwrap();
        assert!(matches!(
            load_config_with_env(Some(&path), |_| None),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config_with_env(Some(&dir.path().join("absent.toml")), |_| None).unwrap();
        assert_eq!(config.probe_limit, 5);
    }
}
