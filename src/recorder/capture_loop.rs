//! Capture loop
//!
//! Runs on its own thread for as long as one capture run holds the camera.
//! Each iteration reads a frame and, while recording, writes it to the
//! encoder under the session lock. It then builds the preview copy and
//! paces itself with the lock released.

use super::error::RecorderError;
use super::session::{SharedSession, Teardown};
use super::state::{PreviewFrame, RecordingEvent, StopReason};
use crate::capture::{preview_frame, PixelLayout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

/// Everything one loop run needs; owned by the loop thread
pub struct LoopContext {
    pub shared: Arc<SharedSession>,
    pub run: u64,
    pub cancel: Arc<AtomicBool>,
    /// Read every iteration so mirroring can change mid-run
    pub mirror_preview: Arc<AtomicBool>,
    pub preview_layout: PixelLayout,
    pub frame_interval: Duration,
    pub preview_tx: mpsc::Sender<PreviewFrame>,
    pub event_tx: broadcast::Sender<RecordingEvent>,
}

/// Pacing interval for a frame rate
pub fn frame_interval(frame_rate: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(frame_rate.max(1)))
}

/// Spawn the loop on a named thread
pub fn spawn(ctx: LoopContext) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("capture-loop".to_string())
        .spawn(move || run(ctx))
}

/// Run until cancelled, superseded or the camera fails
pub fn run(ctx: LoopContext) {
    tracing::debug!("Capture loop {} started", ctx.run);
    let loop_start = Instant::now();
    let mut dropped_previews: u64 = 0;

    loop {
        let iteration_start = Instant::now();

        if ctx.cancel.load(Ordering::SeqCst) {
            break;
        }

        let (frame, status, write_failure) = {
            let mut slot = ctx.shared.lock();
            if !slot.is_current(ctx.run) {
                break;
            }

            let frame = match slot.read_frame() {
                Ok(frame) => frame,
                Err(error) => {
                    let camera = slot.device_index();
                    slot.set_last_error(error.to_string());
                    let teardown = slot.teardown();
                    drop(slot);

                    tracing::warn!("Camera {:?} stopped delivering frames: {}", camera, error);
                    match teardown {
                        Some(teardown) => report_stopped(&ctx, teardown, StopReason::DeviceEnded),
                        None => {
                            let _ = ctx.event_tx.send(RecordingEvent::Error(error.to_string()));
                        }
                    }
                    break;
                }
            };

            let write_failure = match slot.record_frame(&frame) {
                Ok(()) => None,
                Err(error) => {
                    slot.set_last_error(error.to_string());
                    let teardown = slot.end_recording();
                    if !slot.is_previewing() {
                        slot.release_device();
                    }
                    Some((error, teardown))
                }
            };

            (frame, slot.status_line(), write_failure)
        };

        if let Some((error, teardown)) = write_failure {
            report_write_failure(&ctx, error, teardown);
            if ctx.cancel.load(Ordering::SeqCst) {
                break;
            }
        }

        let mirror = ctx.mirror_preview.load(Ordering::Relaxed);
        let preview = PreviewFrame {
            frame: preview_frame(&frame, mirror, ctx.preview_layout),
            status,
        };
        match ctx.preview_tx.try_send(preview) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => dropped_previews += 1,
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }

        if let Some(rest) = ctx.frame_interval.checked_sub(iteration_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    tracing::debug!(
        "Capture loop {} exited after {:.2}s ({} previews dropped)",
        ctx.run,
        loop_start.elapsed().as_secs_f64(),
        dropped_previews
    );
}

fn report_write_failure(ctx: &LoopContext, error: RecorderError, teardown: Option<Teardown>) {
    tracing::error!("Recording aborted: {}", error);
    let _ = ctx.event_tx.send(RecordingEvent::Error(error.to_string()));
    if let Some(teardown) = teardown {
        report_stopped(ctx, teardown, StopReason::EncoderFailed);
    }
}

fn report_stopped(ctx: &LoopContext, teardown: Teardown, reason: StopReason) {
    if let Err(e) = &teardown.finish {
        tracing::error!("Failed to finalize {:?}: {}", teardown.session.output_path, e);
    }
    let _ = ctx.event_tx.send(RecordingEvent::Stopped {
        path: teardown.session.output_path,
        frames: teardown.frames,
        reason,
    });
}
