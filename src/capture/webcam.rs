//! Webcam capture using nokhwa
//!
//! The native camera handle lives on a dedicated worker thread for its whole
//! life. `WebcamDevice` talks to that thread over channels, so the handle
//! itself can move freely between the controller and the capture loop.

use super::frame::{Frame, PixelLayout};
use super::traits::{CameraInfo, CaptureDevice, DeviceProvider, Resolution};
use crate::recorder::{RecorderError, RecorderResult};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::JoinHandle;

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .filter_map(|info| {
                let index = match info.index() {
                    CameraIndex::Index(i) => *i,
                    CameraIndex::String(s) => s.parse::<u32>().ok()?,
                };
                Some(CameraInfo {
                    index,
                    name: info.human_name(),
                    description: info.description().to_string(),
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

/// Find the camera indices in `0..max_test` that open and deliver a frame
///
/// Falls back to `[0]` when nothing responds so callers always have a
/// selection to offer.
pub fn probe_camera_indices(provider: &dyn DeviceProvider, max_test: u32) -> Vec<u32> {
    let mut found = Vec::new();
    for index in 0..max_test {
        match provider.open(index) {
            Ok(mut device) => {
                device.close();
                found.push(index);
            }
            Err(e) => tracing::debug!("Camera {} not usable: {}", index, e),
        }
    }

    if found.is_empty() {
        vec![0]
    } else {
        found
    }
}

enum WorkerCommand {
    Read,
}

/// Opens nokhwa cameras
#[derive(Debug, Default, Clone, Copy)]
pub struct WebcamProvider;

impl DeviceProvider for WebcamProvider {
    fn open(&self, index: u32) -> RecorderResult<Box<dyn CaptureDevice>> {
        Ok(Box::new(WebcamDevice::open(index)?))
    }
}

/// A nokhwa camera owned by a worker thread
pub struct WebcamDevice {
    index: u32,
    resolution: Resolution,
    commands: Option<Sender<WorkerCommand>>,
    frames: Receiver<RecorderResult<Frame>>,
    worker: Option<JoinHandle<()>>,
}

impl WebcamDevice {
    /// Open the camera and read one probe frame
    pub fn open(index: u32) -> RecorderResult<Self> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<RecorderResult<Resolution>>(1);
        let (command_tx, command_rx) = mpsc::channel::<WorkerCommand>();
        let (frame_tx, frame_rx) = mpsc::sync_channel::<RecorderResult<Frame>>(1);

        let worker = std::thread::Builder::new()
            .name(format!("webcam-{index}"))
            .spawn(move || run_worker(index, ready_tx, command_rx, frame_tx))?;

        let resolution = match ready_rx.recv() {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(RecorderError::DeviceUnavailable(format!(
                    "camera {index} worker exited during open"
                )));
            }
        };

        tracing::info!("Webcam {} opened at {}", index, resolution);

        Ok(Self {
            index,
            resolution,
            commands: Some(command_tx),
            frames: frame_rx,
            worker: Some(worker),
        })
    }
}

impl CaptureDevice for WebcamDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn dimensions(&self) -> Resolution {
        self.resolution
    }

    fn read_frame(&mut self) -> RecorderResult<Frame> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| RecorderError::ReadFailure("device is closed".to_string()))?;

        commands
            .send(WorkerCommand::Read)
            .map_err(|_| RecorderError::ReadFailure("camera worker stopped".to_string()))?;

        self.frames
            .recv()
            .map_err(|_| RecorderError::ReadFailure("camera worker stopped".to_string()))?
    }

    fn close(&mut self) {
        // Dropping the sender ends the worker loop
        if self.commands.take().is_none() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Webcam {} worker panicked", self.index);
            }
        }
        tracing::info!("Webcam {} closed", self.index);
    }

    fn is_open(&self) -> bool {
        self.commands.is_some()
    }
}

impl Drop for WebcamDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    index: u32,
    ready: SyncSender<RecorderResult<Resolution>>,
    commands: Receiver<WorkerCommand>,
    frames: SyncSender<RecorderResult<Frame>>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(RecorderError::DeviceUnavailable(format!(
                "failed to open camera {index}: {e}"
            ))));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(RecorderError::DeviceUnavailable(format!(
            "failed to open stream on camera {index}: {e}"
        ))));
        return;
    }

    // Probe: a camera that opens but never delivers is unusable
    let resolution = match grab_frame(&mut camera) {
        Ok(frame) => Resolution {
            width: frame.width(),
            height: frame.height(),
        },
        Err(e) => {
            let _ = camera.stop_stream();
            let _ = ready.send(Err(RecorderError::DeviceUnavailable(format!(
                "camera {index} returned no frame on probe: {e}"
            ))));
            return;
        }
    };

    tracing::debug!(
        "Webcam {} negotiated {:?} -> decoded {}",
        index,
        camera.camera_format(),
        resolution
    );

    if ready.send(Ok(resolution)).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    while let Ok(WorkerCommand::Read) = commands.recv() {
        let result = grab_frame(&mut camera);
        let failed = result.is_err();
        if frames.send(result).is_err() || failed {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
}

fn grab_frame(camera: &mut Camera) -> RecorderResult<Frame> {
    let buffer = camera
        .frame()
        .map_err(|e| RecorderError::ReadFailure(format!("failed to capture frame: {e}")))?;
    let image = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| RecorderError::ReadFailure(format!("failed to decode frame: {e}")))?;

    let (width, height) = (image.width(), image.height());
    Frame::new(width, height, PixelLayout::Rgb24, image.into_raw())
}
