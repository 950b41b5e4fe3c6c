//! Scripted devices and encoders for exercising the controller

use super::error::{RecorderError, RecorderResult};
use crate::capture::{CaptureDevice, DeviceProvider, Frame, PixelLayout, Resolution};
use crate::encoder::{EncoderProvider, EncoderSettings, FrameEncoder};
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Frame whose pixel (x, y) is (x, y, seq)
pub fn column_frame(resolution: Resolution, seq: u8) -> Frame {
    let mut data = Vec::with_capacity((resolution.width * resolution.height * 3) as usize);
    for y in 0..resolution.height {
        for x in 0..resolution.width {
            data.extend_from_slice(&[x as u8, y as u8, seq]);
        }
    }
    Frame::new(resolution.width, resolution.height, PixelLayout::Rgb24, data).unwrap()
}

#[derive(Clone)]
pub struct FakeDevices {
    pub available: Vec<u32>,
    pub resolution: Resolution,
    /// Frames delivered before reads start failing; `None` never fails
    pub frames_before_failure: Option<u32>,
    pub live: Arc<AtomicUsize>,
    pub opened: Arc<AtomicUsize>,
}

impl FakeDevices {
    pub fn new(available: Vec<u32>) -> Self {
        Self {
            available,
            resolution: Resolution { width: 8, height: 4 },
            frames_before_failure: None,
            live: Arc::new(AtomicUsize::new(0)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_after(mut self, frames: u32) -> Self {
        self.frames_before_failure = Some(frames);
        self
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl DeviceProvider for FakeDevices {
    fn open(&self, index: u32) -> RecorderResult<Box<dyn CaptureDevice>> {
        if !self.available.contains(&index) {
            return Err(RecorderError::DeviceUnavailable(format!("camera {index} not present")));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDevice {
            index,
            resolution: self.resolution,
            remaining: self.frames_before_failure,
            seq: 0,
            open: true,
            live: self.live.clone(),
        }))
    }
}

struct FakeDevice {
    index: u32,
    resolution: Resolution,
    remaining: Option<u32>,
    seq: u8,
    open: bool,
    live: Arc<AtomicUsize>,
}

impl CaptureDevice for FakeDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn dimensions(&self) -> Resolution {
        self.resolution
    }

    fn read_frame(&mut self) -> RecorderResult<Frame> {
        if !self.open {
            return Err(RecorderError::ReadFailure("closed".to_string()));
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(RecorderError::ReadFailure("end of stream".to_string()));
            }
            *remaining -= 1;
        }
        self.seq = self.seq.wrapping_add(1);
        Ok(column_frame(self.resolution, self.seq))
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// What one fake encoder received
#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub path: PathBuf,
    pub settings: EncoderSettings,
    pub frames: Vec<Frame>,
    pub finish_calls: usize,
}

#[derive(Clone, Default)]
pub struct FakeEncoders {
    pub fail_create: bool,
    /// Writes accepted before the next one fails
    pub fail_after: Option<u64>,
    pub files: Arc<Mutex<Vec<EncodedFile>>>,
    pub live: Arc<AtomicUsize>,
}

impl FakeEncoders {
    pub fn files(&self) -> Vec<EncodedFile> {
        self.files.lock().clone()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl EncoderProvider for FakeEncoders {
    fn create(&self, path: &Path, settings: EncoderSettings) -> RecorderResult<Box<dyn FrameEncoder>> {
        if self.fail_create {
            return Err(RecorderError::EncoderInitFailure("codec unavailable".to_string()));
        }
        let file = File::create(path)
            .map_err(|e| RecorderError::EncoderInitFailure(format!("cannot create {:?}: {}", path, e)))?;

        let slot = {
            let mut files = self.files.lock();
            files.push(EncodedFile {
                path: path.to_path_buf(),
                settings,
                frames: Vec::new(),
                finish_calls: 0,
            });
            files.len() - 1
        };
        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeEncoder {
            file: Some(file),
            slot,
            settings,
            fail_after: self.fail_after,
            written: 0,
            files: self.files.clone(),
            live: self.live.clone(),
        }))
    }
}

struct FakeEncoder {
    file: Option<File>,
    slot: usize,
    settings: EncoderSettings,
    fail_after: Option<u64>,
    written: u64,
    files: Arc<Mutex<Vec<EncodedFile>>>,
    live: Arc<AtomicUsize>,
}

impl FrameEncoder for FakeEncoder {
    fn write_frame(&mut self, frame: &Frame) -> RecorderResult<()> {
        if frame.dimensions() != (self.settings.width, self.settings.height) {
            return Err(RecorderError::EncoderWriteFailure("size mismatch".to_string()));
        }
        if self.fail_after == Some(self.written) {
            return Err(RecorderError::EncoderWriteFailure("disk full".to_string()));
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| RecorderError::EncoderWriteFailure("finished".to_string()))?;
        file.write_all(frame.data())?;
        self.files.lock()[self.slot].frames.push(frame.clone());
        self.written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    fn finish(&mut self) -> RecorderResult<u64> {
        self.files.lock()[self.slot].finish_calls += 1;
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(self.written)
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
