//! FFmpeg encoder for recorded camera frames
//!
//! Raw frames are streamed over stdin and muxed into an MPEG-4 container
//! with the `mp4v` codec tag.

use super::traits::{EncoderProvider, EncoderSettings, FrameEncoder};
use crate::capture::Frame;
use crate::recorder::{RecorderError, RecorderResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// A freshly spawned encoder must outlive this to count as started
const STARTUP_GRACE: Duration = Duration::from_millis(150);
const STARTUP_POLL: Duration = Duration::from_millis(10);

/// Stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Spawns one ffmpeg process per recording
#[derive(Debug, Clone)]
pub struct FfmpegEncoderProvider {
    ffmpeg_path: String,
}

impl FfmpegEncoderProvider {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegEncoderProvider {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderProvider for FfmpegEncoderProvider {
    fn create(&self, path: &Path, settings: EncoderSettings) -> RecorderResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(FfmpegEncoder::new(&self.ffmpeg_path, path, settings)?))
    }
}

/// Build the ffmpeg argument list for a raw-stdin MPEG-4 recording
pub fn build_args(settings: &EncoderSettings, output_path: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        settings.input_layout.ffmpeg_pix_fmt().to_string(),
        "-video_size".to_string(),
        format!("{}x{}", settings.width, settings.height),
        "-framerate".to_string(),
        settings.frame_rate.to_string(),
        "-i".to_string(),
        "-".to_string(),
        "-an".to_string(),
        "-c:v".to_string(),
        "mpeg4".to_string(),
        "-vtag".to_string(),
        "mp4v".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        output_path.to_string_lossy().to_string(),
    ]
}

/// Drains a child's stderr on its own thread, keeping the last few lines
struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    reader: Option<JoinHandle<()>>,
}

impl StderrTail {
    fn spawn(stderr: Option<ChildStderr>) -> Self {
        let lines = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let reader = stderr.and_then(|stderr| {
            let sink = lines.clone();
            std::thread::Builder::new()
                .name("ffmpeg-stderr".to_string())
                .spawn(move || {
                    for line in BufReader::new(stderr).lines() {
                        let Ok(line) = line else { break };
                        if line.trim().is_empty() {
                            continue;
                        }
                        tracing::debug!("ffmpeg: {}", line);
                        let mut tail = sink.lock();
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                })
                .map_err(|e| tracing::warn!("Failed to start FFmpeg stderr reader: {}", e))
                .ok()
        });
        Self { lines, reader }
    }

    /// Wait for EOF on the pipe and return the collected lines
    fn collect(&mut self) -> String {
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let lines = self.lines.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Video encoder backed by an ffmpeg child process
pub struct FfmpegEncoder {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: StderrTail,
    settings: EncoderSettings,
    output_path: PathBuf,
    frame_count: u64,
}

impl FfmpegEncoder {
    /// Start ffmpeg writing to `output_path`
    pub fn new(ffmpeg_path: &str, output_path: &Path, settings: EncoderSettings) -> RecorderResult<Self> {
        let args = build_args(&settings, output_path);
        tracing::debug!("Starting FFmpeg encoder: {} {:?}", ffmpeg_path, args);

        let mut command = Command::new(ffmpeg_path);
        command.args(&args);
        Self::spawn(command, output_path, settings)
    }

    /// Start a prepared encoder command
    ///
    /// The command reads raw frames in `settings.input_layout` from stdin
    /// and writes `output_path`. A process that exits within the startup
    /// grace period is an init failure and leaves no file behind.
    pub fn spawn(mut command: Command, output_path: &Path, settings: EncoderSettings) -> RecorderResult<Self> {
        if settings.width == 0 || settings.height == 0 || settings.frame_rate == 0 {
            return Err(RecorderError::EncoderInitFailure(format!(
                "invalid encoder settings {:?}",
                settings
            )));
        }

        // ffmpeg only opens the output once the first frame arrives
        File::create(output_path).map_err(|e| {
            RecorderError::EncoderInitFailure(format!("cannot create {:?}: {}", output_path, e))
        })?;

        let program = command.get_program().to_string_lossy().into_owned();
        let mut process = match command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(p) => p,
            Err(e) => {
                let _ = std::fs::remove_file(output_path);
                return Err(RecorderError::EncoderInitFailure(format!(
                    "failed to start {}: {}",
                    program, e
                )));
            }
        };

        let mut stderr = StderrTail::spawn(process.stderr.take());

        let Some(stdin) = process.stdin.take() else {
            let _ = process.kill();
            let _ = process.wait();
            let _ = std::fs::remove_file(output_path);
            return Err(RecorderError::EncoderInitFailure(
                "failed to capture FFmpeg stdin".to_string(),
            ));
        };

        match early_exit(&mut process) {
            Ok(None) => {}
            Ok(Some(status)) => {
                drop(stdin);
                let detail = stderr.collect();
                let _ = std::fs::remove_file(output_path);
                let mut message = format!("{} exited during startup ({})", program, status);
                if !detail.is_empty() {
                    message.push_str(": ");
                    message.push_str(detail.trim());
                }
                tracing::warn!("{}", message);
                return Err(RecorderError::EncoderInitFailure(message));
            }
            Err(e) => {
                let _ = process.kill();
                let _ = process.wait();
                let _ = std::fs::remove_file(output_path);
                return Err(RecorderError::EncoderInitFailure(format!(
                    "failed to check {} status: {}",
                    program, e
                )));
            }
        }

        tracing::info!(
            "Started FFmpeg encoder: {}x{} @ {}fps, pixel_format={}, output: {:?}",
            settings.width,
            settings.height,
            settings.frame_rate,
            settings.input_layout.ffmpeg_pix_fmt(),
            output_path
        );

        Ok(Self {
            process: Some(process),
            stdin: Some(stdin),
            stderr,
            settings,
            output_path: output_path.to_path_buf(),
            frame_count: 0,
        })
    }
}

/// Poll a just-spawned child until the startup grace period ends
///
/// Returns the exit status if it already exited.
fn early_exit(process: &mut Child) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + STARTUP_GRACE;
    loop {
        if let Some(status) = process.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(STARTUP_POLL);
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn write_frame(&mut self, frame: &Frame) -> RecorderResult<()> {
        if frame.dimensions() != (self.settings.width, self.settings.height) {
            return Err(RecorderError::EncoderWriteFailure(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.settings.width,
                self.settings.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::EncoderWriteFailure("encoder is finished".to_string()))?;

        let converted;
        let frame = if frame.layout() == self.settings.input_layout {
            frame
        } else {
            converted = frame.to_layout(self.settings.input_layout);
            &converted
        };

        stdin
            .write_all(frame.data())
            .map_err(|e| RecorderError::EncoderWriteFailure(format!("failed to write frame: {}", e)))?;
        self.frame_count += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frame_count
    }

    fn finish(&mut self) -> RecorderResult<u64> {
        // Close stdin to signal EOF
        drop(self.stdin.take());

        let Some(mut process) = self.process.take() else {
            return Ok(self.frame_count);
        };

        let status = process
            .wait()
            .map_err(|e| RecorderError::EncoderWriteFailure(format!("failed to wait for FFmpeg: {}", e)))?;
        let detail = self.stderr.collect();

        if !status.success() {
            tracing::warn!("FFmpeg exited with status {}: {}", status, detail);
            return Err(RecorderError::EncoderWriteFailure(format!(
                "FFmpeg exited with {}: {}",
                status,
                detail.trim()
            )));
        }

        tracing::info!(
            "FFmpeg encoder finished: {} frames, output: {:?}",
            self.frame_count,
            self.output_path
        );
        Ok(self.frame_count)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.process.is_some() {
            if let Err(e) = self.finish() {
                tracing::warn!("FFmpeg encoder dropped unfinished: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelLayout;
    use tempfile::tempdir;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 640,
            height: 480,
            frame_rate: 25,
            input_layout: PixelLayout::Rgb24,
        }
    }

    fn tiny() -> EncoderSettings {
        EncoderSettings {
            width: 4,
            height: 2,
            frame_rate: 25,
            input_layout: PixelLayout::Rgb24,
        }
    }

    /// Shell stand-in for ffmpeg: runs `script` with the output path as `$1`
    #[cfg(unix)]
    fn shell_encoder(script: &str, path: &Path) -> RecorderResult<FfmpegEncoder> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script).arg("sh").arg(path);
        FfmpegEncoder::spawn(command, path, tiny())
    }

    #[test]
    fn test_args_use_mp4v_tag_and_fixed_size() {
        let args = build_args(&settings(), Path::new("VIDEO_MP4/video_2024_01_01_00_00_00.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo"));
        assert!(joined.contains("-pixel_format rgb24"));
        assert!(joined.contains("-video_size 640x480"));
        assert!(joined.contains("-framerate 25"));
        assert!(joined.contains("-c:v mpeg4 -vtag mp4v"));
        assert_eq!(args.last().map(String::as_str), Some("VIDEO_MP4/video_2024_01_01_00_00_00.mp4"));
    }

    #[test]
    fn test_args_follow_input_layout() {
        let mut s = settings();
        s.input_layout = PixelLayout::Bgr24;
        let args = build_args(&s, Path::new("out.mp4"));
        assert!(args.join(" ").contains("-pixel_format bgr24"));
    }

    #[test]
    fn test_missing_directory_is_init_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("out.mp4");
        let result = FfmpegEncoder::new("ffmpeg", &path, settings());
        assert!(matches!(result, Err(RecorderError::EncoderInitFailure(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_binary_is_init_failure_and_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let result = FfmpegEncoder::new("definitely-not-an-ffmpeg-binary", &path, settings());
        assert!(matches!(result, Err(RecorderError::EncoderInitFailure(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_zero_frame_rate_is_rejected() {
        let dir = tempdir().unwrap();
        let mut s = settings();
        s.frame_rate = 0;
        let result = FfmpegEncoder::new("ffmpeg", &dir.path().join("out.mp4"), s);
        assert!(matches!(result, Err(RecorderError::EncoderInitFailure(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_exiting_at_startup_is_init_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let result = FfmpegEncoder::new("false", &path, tiny());
        assert!(matches!(result, Err(RecorderError::EncoderInitFailure(_))));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_startup_failure_carries_stderr() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let result = shell_encoder("echo 'Unknown encoder mpeg4' >&2; exit 1", &path);
        match result {
            Err(RecorderError::EncoderInitFailure(msg)) => assert!(msg.contains("Unknown encoder mpeg4"), "{msg}"),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("encoder should not start"),
        }
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_frames_reach_output_and_finish_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut encoder = shell_encoder("cat > \"$1\"", &path).unwrap();

        let frame = Frame::solid(4, 2, PixelLayout::Rgb24, [1, 2, 3]).unwrap();
        encoder.write_frame(&frame).unwrap();
        encoder.write_frame(&frame).unwrap();
        assert_eq!(encoder.frames_written(), 2);

        assert_eq!(encoder.finish().unwrap(), 2);
        assert_eq!(encoder.finish().unwrap(), 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * 4 * 2 * 3);

        let late = encoder.write_frame(&frame);
        assert!(matches!(late, Err(RecorderError::EncoderWriteFailure(_))));
        assert_eq!(encoder.frames_written(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_frames_converted_to_input_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut encoder = shell_encoder("cat > \"$1\"", &path).unwrap();

        let rgba = Frame::solid(4, 2, PixelLayout::Rgba32, [10, 20, 30]).unwrap();
        encoder.write_frame(&rgba).unwrap();
        encoder.finish().unwrap();

        let expected = Frame::solid(4, 2, PixelLayout::Rgb24, [10, 20, 30]).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), expected.data());
    }

    #[cfg(unix)]
    #[test]
    fn test_mismatched_frame_is_write_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut encoder = shell_encoder("cat > \"$1\"", &path).unwrap();

        let wrong = Frame::solid(3, 2, PixelLayout::Rgb24, [0, 0, 0]).unwrap();
        let result = encoder.write_frame(&wrong);
        assert!(matches!(result, Err(RecorderError::EncoderWriteFailure(msg)) if msg.contains("3x2")));
        assert_eq!(encoder.frames_written(), 0);
        assert_eq!(encoder.finish().unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_write_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut encoder = shell_encoder("cat > /dev/null; echo 'muxer failed' >&2; exit 3", &path).unwrap();

        let frame = Frame::solid(4, 2, PixelLayout::Rgb24, [9, 9, 9]).unwrap();
        encoder.write_frame(&frame).unwrap();

        match encoder.finish() {
            Err(RecorderError::EncoderWriteFailure(msg)) => assert!(msg.contains("muxer failed"), "{msg}"),
            other => panic!("unexpected finish result {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_finishes_encoder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        {
            let mut encoder = shell_encoder("cat > \"$1\"", &path).unwrap();
            let frame = Frame::solid(4, 2, PixelLayout::Rgb24, [5, 6, 7]).unwrap();
            encoder.write_frame(&frame).unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4 * 2 * 3);
    }
}
