//! Recorded file inspection via FFprobe

use crate::utils::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Video metadata returned from FFprobe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: f64,
    pub codec: String,
    pub codec_tag: String,
    pub frame_count: Option<u64>,
}

/// Read metadata of the first video stream in `path`
pub fn probe_video(ffprobe_path: &str, path: &Path) -> AppResult<VideoMetadata> {
    let output = Command::new(ffprobe_path)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
            "-select_streams",
            "v:0",
        ])
        .arg(path)
        .output()
        .map_err(|e| AppError::Platform(format!("Failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(AppError::Platform(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `ffprobe -print_format json` output
pub fn parse_probe_output(json_str: &str) -> AppResult<VideoMetadata> {
    let json: serde_json::Value = serde_json::from_str(json_str)?;

    let video_stream = json
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|streams| streams.first())
        .ok_or_else(|| AppError::Platform("No video stream found".to_string()))?;

    let width = video_stream.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let height = video_stream.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32;

    let codec = video_stream
        .get("codec_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let codec_tag = video_stream
        .get("codec_tag_string")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    // "25/1" or "29.97"
    let fps = video_stream
        .get("r_frame_rate")
        .and_then(|v| v.as_str())
        .map(parse_rate)
        .unwrap_or(0.0);

    let frame_count = video_stream
        .get("nb_frames")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u64>().ok());

    let duration_secs = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        width,
        height,
        fps,
        duration_ms: duration_secs * 1000.0,
        codec,
        codec_tag,
        frame_count,
    })
}

fn parse_rate(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().unwrap_or(0.0);
            let den: f64 = den.parse().unwrap_or(1.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.parse().unwrap_or(0.0),
    }
}
