//! Shared session state
//!
//! One mutex guards the state enum, the active session, the device handle
//! and the encoder. The device belongs to a capture run, which may preview,
//! record or both; the encoder belongs to a single recording. Both are moved
//! out on release, so whichever of {capture loop, controller} gets there
//! first is the only one that ever closes them.

use super::error::{RecorderError, RecorderResult};
use super::state::{RecordingSession, RecordingState};
use crate::capture::{CaptureDevice, Frame, Resolution};
use crate::encoder::FrameEncoder;
use parking_lot::{Mutex, MutexGuard};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Contents of the session lock
pub struct SessionSlot {
    state: RecordingState,
    session: Option<RecordingSession>,
    last_output_path: Option<PathBuf>,
    device: Option<Box<dyn CaptureDevice>>,
    encoder: Option<Box<dyn FrameEncoder>>,
    previewing: bool,
    cancel: Arc<AtomicBool>,
    run: u64,
    frames_written: u64,
    last_error: Option<String>,
}

/// Result of ending a recording
#[derive(Debug)]
pub struct Teardown {
    pub session: RecordingSession,
    pub frames: u64,
    /// Outcome of flushing the encoder
    pub finish: RecorderResult<u64>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            session: None,
            last_output_path: None,
            device: None,
            encoder: None,
            previewing: false,
            cancel: Arc::new(AtomicBool::new(true)),
            run: 0,
            frames_written: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    /// Number of the capture run that owns the device
    pub fn run(&self) -> u64 {
        self.run
    }

    /// True while `run` still owns an open device
    pub fn is_current(&self, run: u64) -> bool {
        self.run == run && self.device.is_some()
    }

    pub fn device_index(&self) -> Option<u32> {
        self.device.as_ref().map(|d| d.index())
    }

    pub fn device_dimensions(&self) -> Option<Resolution> {
        self.device.as_ref().map(|d| d.dimensions())
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }

    pub fn set_previewing(&mut self, previewing: bool) {
        self.previewing = previewing;
    }

    /// Install a freshly opened device as a new capture run
    ///
    /// Returns the run number and its cancel flag for the loop.
    pub fn attach_device(&mut self, device: Box<dyn CaptureDevice>) -> (u64, Arc<AtomicBool>) {
        debug_assert!(self.device.is_none());

        self.run += 1;
        self.cancel = Arc::new(AtomicBool::new(false));
        self.device = Some(device);
        (self.run, self.cancel.clone())
    }

    /// Swap the device of the running capture run, closing the old one
    pub fn replace_device(&mut self, device: Box<dyn CaptureDevice>) {
        debug_assert!(self.encoder.is_none());

        if let Some(mut old) = self.device.replace(device) {
            old.close();
        }
    }

    /// Attach an encoder to the open device and enter `Recording`
    pub fn begin_recording(&mut self, session: RecordingSession, encoder: Box<dyn FrameEncoder>) {
        debug_assert!(self.device.is_some() && self.encoder.is_none());

        self.last_output_path = Some(session.output_path.clone());
        self.session = Some(session);
        self.encoder = Some(encoder);
        self.frames_written = 0;
        self.last_error = None;
        self.state = RecordingState::Recording;
    }

    pub fn read_frame(&mut self) -> RecorderResult<Frame> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| RecorderError::ReadFailure("device already released".to_string()))?;
        device.read_frame()
    }

    /// Write the frame, unmodified, when a recording is active
    pub fn record_frame(&mut self, frame: &Frame) -> RecorderResult<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Ok(());
        };
        encoder.write_frame(frame)?;
        self.frames_written = encoder.frames_written();
        Ok(())
    }

    /// Status line shown alongside each preview frame
    pub fn status_line(&self) -> String {
        match (&self.session, self.device_index()) {
            (Some(session), _) => format!(
                "Recording → {} ({} frames)",
                session.output_path.display(),
                self.frames_written
            ),
            (None, Some(index)) => format!("Previewing camera {}", index),
            (None, None) => "Idle".to_string(),
        }
    }

    /// Finish the encoder and return to `Idle`, keeping the device
    ///
    /// Returns `None` when nothing was recording.
    pub fn end_recording(&mut self) -> Option<Teardown> {
        self.state = RecordingState::Idle;

        let session = self.session.take()?;

        let finish = match self.encoder.take() {
            Some(mut encoder) => encoder.finish(),
            None => Ok(self.frames_written),
        };
        if let Ok(frames) = finish {
            self.frames_written = frames;
        }

        Some(Teardown {
            session,
            frames: self.frames_written,
            finish,
        })
    }

    /// Close the device and cancel its capture run
    pub fn release_device(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.previewing = false;

        if let Some(mut device) = self.device.take() {
            device.close();
        }
    }

    /// End any recording and release the device
    pub fn teardown(&mut self) -> Option<Teardown> {
        let teardown = self.end_recording();
        self.release_device();
        teardown
    }

    pub fn set_last_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_output_path(&self) -> Option<&PathBuf> {
        self.last_output_path.as_ref()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn has_resources(&self) -> bool {
        self.device.is_some() || self.encoder.is_some()
    }
}

/// The process-wide capture session, shared between the controller and
/// the capture loop
pub struct SharedSession {
    slot: Mutex<SessionSlot>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(SessionSlot::new()),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock()
    }

    pub fn state(&self) -> RecordingState {
        self.slot.lock().state()
    }
}

impl Default for SharedSession {
    fn default() -> Self {
        Self::new()
    }
}
