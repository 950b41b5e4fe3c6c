//! Recording coordinator
//!
//! Owns the shared session and drives the preview and start/stop protocol.
//! Each transition happens inside one critical section of the session lock;
//! a second control mutex serializes the control calls so one of them can
//! join the capture thread without racing another.
//!
//! The camera is held by a capture run. A run starts with either
//! `start_preview` or `start`, and a recording started while previewing
//! reuses the preview's camera.

use super::capture_loop::{self, LoopContext};
use super::error::RecorderError;
use super::output::{ensure_output_dir, next_output_path};
use super::session::{SessionSlot, SharedSession};
use super::state::{PreviewFrame, RecordingEvent, RecordingSession, RecordingState, StatusReport, StopReason};
use crate::capture::{CaptureDevice, DeviceProvider, PixelLayout, WebcamProvider};
use crate::config::RecorderConfig;
use crate::encoder::{EncoderProvider, EncoderSettings, FfmpegEncoderProvider};
use chrono::{Local, Utc};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{broadcast, mpsc};

/// Layout recorded frames are handed to the encoder in
const RECORD_LAYOUT: PixelLayout = PixelLayout::Rgb24;

/// Preview and recording controller for one camera at a time
pub struct SessionController {
    shared: Arc<SharedSession>,
    devices: Arc<dyn DeviceProvider>,
    encoders: Arc<dyn EncoderProvider>,
    config: RecorderConfig,

    /// Serializes control-plane operations; holds the capture thread
    control: Mutex<Option<JoinHandle<()>>>,

    mirror_preview: Arc<AtomicBool>,

    preview_tx: mpsc::Sender<PreviewFrame>,
    preview_rx: Mutex<Option<mpsc::Receiver<PreviewFrame>>>,

    event_tx: broadcast::Sender<RecordingEvent>,
}

impl SessionController {
    /// Create a controller with explicit device and encoder backends
    pub fn new(
        config: RecorderConfig,
        devices: Arc<dyn DeviceProvider>,
        encoders: Arc<dyn EncoderProvider>,
    ) -> Self {
        let (preview_tx, preview_rx) = mpsc::channel(config.preview_capacity.max(1));
        let (event_tx, _) = broadcast::channel(100);
        Self {
            shared: Arc::new(SharedSession::new()),
            devices,
            encoders,
            mirror_preview: Arc::new(AtomicBool::new(config.mirror_preview)),
            config,
            control: Mutex::new(None),
            preview_tx,
            preview_rx: Mutex::new(Some(preview_rx)),
            event_tx,
        }
    }

    /// nokhwa camera + ffmpeg encoder
    pub fn with_defaults(config: RecorderConfig) -> Self {
        let encoders = Arc::new(FfmpegEncoderProvider::new(config.ffmpeg_path.clone()));
        Self::new(config, Arc::new(WebcamProvider), encoders)
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        self.shared.state()
    }

    /// The active session, if recording
    pub fn session(&self) -> Option<RecordingSession> {
        self.shared.lock().session().cloned()
    }

    /// Output path of the active recording
    pub fn current_output_path(&self) -> Option<PathBuf> {
        self.shared.lock().session().map(|s| s.output_path.clone())
    }

    /// Path of the most recent recording, active or finished
    pub fn last_output_path(&self) -> Option<PathBuf> {
        self.shared.lock().last_output_path().cloned()
    }

    /// Frames written to the current (or last) output file
    pub fn frames_written(&self) -> u64 {
        self.shared.lock().frames_written()
    }

    /// Error that ended the last recording, cleared on the next start
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error().map(str::to_string)
    }

    /// Whether a device or encoder is currently held
    pub fn holds_resources(&self) -> bool {
        self.shared.lock().has_resources()
    }

    /// Whether a preview was requested and its camera is still open
    pub fn is_previewing(&self) -> bool {
        self.shared.lock().is_previewing()
    }

    pub fn mirror_preview(&self) -> bool {
        self.mirror_preview.load(Ordering::Relaxed)
    }

    /// Flip preview mirroring; takes effect on the next frame
    pub fn set_mirror(&self, mirror: bool) {
        self.mirror_preview.store(mirror, Ordering::Relaxed);
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Take the preview feed; only the first caller gets it
    pub fn take_preview(&self) -> Option<mpsc::Receiver<PreviewFrame>> {
        self.preview_rx.lock().take()
    }

    /// Show a live preview of `camera_index` without recording
    ///
    /// While idle, asking for another camera switches the preview to it.
    /// While recording, only the recording's camera can be previewed.
    pub fn start_preview(&self, camera_index: u32, mirror_preview: bool) -> StatusReport {
        let mut control = self.control.lock();
        let mut slot = self.shared.lock();
        let mut previous = None;

        match slot.device_index() {
            Some(index) if index == camera_index => {}
            Some(index) => {
                if let Some(session) = slot.session() {
                    tracing::debug!("Preview of camera {} refused, recording camera {}", camera_index, index);
                    return StatusReport::AlreadyRecording {
                        path: session.output_path.clone(),
                    };
                }
                let device = match self.open_device(camera_index) {
                    Ok(device) => device,
                    Err(report) => return report,
                };
                slot.replace_device(device);
                tracing::info!("Preview switched from camera {} to {}", index, camera_index);
            }
            None => {
                let device = match self.open_device(camera_index) {
                    Ok(device) => device,
                    Err(report) => return report,
                };
                self.set_mirror(mirror_preview);
                match self.spawn_run(&mut slot, device) {
                    Ok(handle) => previous = control.replace(handle),
                    Err(report) => return report,
                }
                tracing::info!("Preview started on camera {}", camera_index);
            }
        }

        slot.set_previewing(true);
        self.set_mirror(mirror_preview);
        drop(slot);

        if let Some(handle) = previous {
            join_loop(handle);
        }
        StatusReport::Previewing { camera_index }
    }

    /// Stop the preview; a running recording keeps its camera
    pub fn stop_preview(&self) -> StatusReport {
        let mut control = self.control.lock();

        let released = {
            let mut slot = self.shared.lock();
            if !slot.is_previewing() {
                return StatusReport::NotPreviewing;
            }
            slot.set_previewing(false);
            if slot.state() == RecordingState::Recording {
                false
            } else {
                slot.release_device();
                true
            }
        };

        if released {
            if let Some(handle) = control.take() {
                join_loop(handle);
            }
        }
        tracing::info!("Preview stopped");
        StatusReport::PreviewStopped
    }

    /// Start recording from `camera_index`
    ///
    /// A no-op reporting the active path when already recording.
    pub fn start(&self, camera_index: u32, mirror_preview: bool) -> StatusReport {
        let mut control = self.control.lock();

        let mut slot = self.shared.lock();
        if let Some(session) = slot.session() {
            tracing::debug!("Start ignored, already recording to {:?}", session.output_path);
            return StatusReport::AlreadyRecording {
                path: session.output_path.clone(),
            };
        }

        tracing::info!("Starting recording from camera {}", camera_index);

        if let Err(e) = ensure_output_dir(&self.config.output_dir) {
            let error = RecorderError::EncoderInitFailure(format!(
                "cannot create output directory {:?}: {}",
                self.config.output_dir, e
            ));
            tracing::warn!("{}", error);
            return StatusReport::failed(&error);
        }

        // A preview of the same camera hands its device over; otherwise
        // the requested camera replaces whatever the preview shows.
        let fresh = match slot.device_index() {
            Some(index) if index == camera_index => {
                tracing::debug!("Recording reuses the preview of camera {}", index);
                None
            }
            held => {
                let device = match self.open_device(camera_index) {
                    Ok(device) => device,
                    Err(report) => return report,
                };
                if held.is_some() {
                    slot.replace_device(device);
                    None
                } else {
                    Some(device)
                }
            }
        };

        let resolution = match fresh.as_ref().map(|d| d.dimensions()).or(slot.device_dimensions()) {
            Some(resolution) => resolution,
            None => {
                let error = RecorderError::DeviceUnavailable(format!("camera {camera_index} is not open"));
                return StatusReport::failed(&error);
            }
        };

        let output_path = next_output_path(&self.config.output_dir, &Local::now());
        let settings = EncoderSettings {
            width: resolution.width,
            height: resolution.height,
            frame_rate: self.config.frame_rate,
            input_layout: RECORD_LAYOUT,
        };

        let encoder = match self.encoders.create(&output_path, settings) {
            Ok(encoder) => encoder,
            Err(e) => {
                tracing::warn!("Encoder for {:?} failed: {}", output_path, e);
                if let Some(mut device) = fresh {
                    device.close();
                }
                return StatusReport::failed(&e);
            }
        };

        self.set_mirror(mirror_preview);

        let mut previous = None;
        if let Some(device) = fresh {
            match self.spawn_run(&mut slot, device) {
                Ok(handle) => previous = control.replace(handle),
                Err(report) => {
                    drop(encoder);
                    let _ = std::fs::remove_file(&output_path);
                    return report;
                }
            }
        }

        let session = RecordingSession {
            generation: slot.run(),
            camera_index,
            output_path: output_path.clone(),
            frame_width: resolution.width,
            frame_height: resolution.height,
            frame_rate: self.config.frame_rate,
            mirror_preview,
            started_at: Utc::now(),
        };
        slot.begin_recording(session, encoder);
        drop(slot);

        if let Some(handle) = previous {
            join_loop(handle);
        }

        tracing::info!(
            "Recording started: {}x{} @ {}fps -> {:?}",
            resolution.width,
            resolution.height,
            self.config.frame_rate,
            output_path
        );
        let _ = self.event_tx.send(RecordingEvent::Started {
            path: output_path.clone(),
        });

        StatusReport::Started { path: output_path }
    }

    /// Stop recording and release the encoder
    ///
    /// The camera is released too unless a preview is running. A no-op
    /// reporting "not recording" when idle.
    pub fn stop(&self) -> StatusReport {
        let mut control = self.control.lock();

        let (teardown, released) = {
            let mut slot = self.shared.lock();
            if slot.state() != RecordingState::Recording {
                return StatusReport::NotRecording;
            }
            tracing::info!("Stopping recording");
            let teardown = slot.end_recording();
            let released = !slot.is_previewing();
            if released {
                slot.release_device();
            }
            (teardown, released)
        };

        if released {
            if let Some(handle) = control.take() {
                join_loop(handle);
            }
        }

        let Some(teardown) = teardown else {
            return StatusReport::NotRecording;
        };
        let path = teardown.session.output_path;

        let _ = self.event_tx.send(RecordingEvent::Stopped {
            path: path.clone(),
            frames: teardown.frames,
            reason: StopReason::Requested,
        });

        match teardown.finish {
            Ok(frames) => {
                tracing::info!("Recording saved: {:?} ({} frames)", path, frames);
                StatusReport::Saved { path, frames }
            }
            Err(e) => {
                tracing::error!("Recording {:?} did not finalize cleanly: {}", path, e);
                self.shared.lock().set_last_error(e.to_string());
                let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                StatusReport::failed(&e)
            }
        }
    }

    /// End any recording or preview and join the capture thread
    fn shutdown(&self) {
        let mut control = self.control.lock();
        let teardown = self.shared.lock().teardown();
        if let Some(handle) = control.take() {
            join_loop(handle);
        }

        if let Some(teardown) = teardown {
            if let Err(e) = &teardown.finish {
                tracing::error!("Recording {:?} did not finalize cleanly: {}", teardown.session.output_path, e);
            }
            let _ = self.event_tx.send(RecordingEvent::Stopped {
                path: teardown.session.output_path,
                frames: teardown.frames,
                reason: StopReason::Requested,
            });
        }
    }

    fn open_device(&self, camera_index: u32) -> Result<Box<dyn CaptureDevice>, StatusReport> {
        self.devices.open(camera_index).map_err(|e| {
            tracing::warn!("Camera {} unavailable: {}", camera_index, e);
            StatusReport::failed(&e)
        })
    }

    /// Hand `device` to a new capture run and start its loop
    fn spawn_run(
        &self,
        slot: &mut SessionSlot,
        device: Box<dyn CaptureDevice>,
    ) -> Result<JoinHandle<()>, StatusReport> {
        let (run, cancel) = slot.attach_device(device);
        let ctx = LoopContext {
            shared: self.shared.clone(),
            run,
            cancel,
            mirror_preview: self.mirror_preview.clone(),
            preview_layout: self.config.preview_layout,
            frame_interval: capture_loop::frame_interval(self.config.frame_rate),
            preview_tx: self.preview_tx.clone(),
            event_tx: self.event_tx.clone(),
        };

        capture_loop::spawn(ctx).map_err(|e| {
            let error = RecorderError::Io(e);
            tracing::error!("Failed to spawn capture loop: {}", error);
            slot.set_last_error(error.to_string());
            slot.release_device();
            StatusReport::failed(&error)
        })
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.holds_resources() {
            tracing::warn!("Controller dropped while holding the camera, releasing");
            self.shutdown();
        }
    }
}

fn join_loop(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("Capture loop panicked");
    }
}
