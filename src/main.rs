//! Command-line front end for the webcam recorder

use clap::{Parser, Subcommand};
use open_webcam_recorder_lib::capture::{list_cameras, probe_camera_indices, WebcamProvider};
use open_webcam_recorder_lib::encoder::probe_video;
use open_webcam_recorder_lib::recorder::StopReason;
use open_webcam_recorder_lib::{init_tracing, load_config, PreviewFrame, RecordingEvent, SessionController};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Parser)]
#[command(name = "open-webcam-recorder", version, about = "Record webcam video to MP4")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record until Ctrl-C (or for a fixed duration)
    Record {
        /// Camera index (defaults to the config value)
        #[arg(long)]
        camera: Option<u32>,

        /// Mirror the preview feed
        #[arg(long)]
        mirror: bool,

        /// Stop automatically after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Show the live preview feed without recording
    Preview {
        /// Camera index (defaults to the config value)
        #[arg(long)]
        camera: Option<u32>,

        /// Mirror the preview feed
        #[arg(long)]
        mirror: bool,

        /// Stop automatically after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// List cameras and the indices that deliver frames
    Cameras,
    /// Print metadata of a recorded file as JSON
    Probe { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    init_tracing(&format!("open_webcam_recorder={log_level},open_webcam_recorder_lib={log_level},warn"));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Record {
            camera,
            mirror,
            seconds,
        } => {
            let camera = camera.unwrap_or(config.camera_index);
            let mirror = mirror || config.mirror_preview;
            record(SessionController::with_defaults(config), camera, mirror, seconds).await
        }
        Command::Preview {
            camera,
            mirror,
            seconds,
        } => {
            let camera = camera.unwrap_or(config.camera_index);
            let mirror = mirror || config.mirror_preview;
            preview(SessionController::with_defaults(config), camera, mirror, seconds).await
        }
        Command::Cameras => {
            for camera in list_cameras() {
                println!("{}: {} ({})", camera.index, camera.name, camera.description);
            }
            let limit = config.probe_limit;
            let usable = tokio::task::spawn_blocking(move || probe_camera_indices(&WebcamProvider, limit)).await?;
            println!("usable indices: {:?}", usable);
            Ok(())
        }
        Command::Probe { file } => {
            let metadata = probe_video(&config.ffprobe_path, &file)?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
            Ok(())
        }
    }
}

async fn record(
    controller: SessionController,
    camera: u32,
    mirror: bool,
    seconds: Option<u64>,
) -> anyhow::Result<()> {
    let controller = Arc::new(controller);
    let mut feed = controller
        .take_preview()
        .ok_or_else(|| anyhow::anyhow!("preview feed already taken"))?;
    let mut events = controller.subscribe();
    tracing::info!("Saving recordings to {:?}", controller.config().output_dir);

    let c = controller.clone();
    let status = tokio::task::spawn_blocking(move || c.start(camera, mirror)).await?;
    println!("{status}");
    if status.is_failure() {
        anyhow::bail!("{status}");
    }

    match watch_feed(&mut feed, &mut events, seconds).await {
        Some(RecordingEvent::Stopped { path, frames, reason }) => {
            println!("Recording ended ({:?}): {} ({} frames)", reason, path.display(), frames);
            return Ok(());
        }
        Some(RecordingEvent::Error(message)) => anyhow::bail!("Recording failed: {message}"),
        _ => {}
    }

    let c = controller.clone();
    let status = tokio::task::spawn_blocking(move || c.stop()).await?;
    println!("{status}");
    Ok(())
}

async fn preview(
    controller: SessionController,
    camera: u32,
    mirror: bool,
    seconds: Option<u64>,
) -> anyhow::Result<()> {
    let controller = Arc::new(controller);
    let mut feed = controller
        .take_preview()
        .ok_or_else(|| anyhow::anyhow!("preview feed already taken"))?;
    let mut events = controller.subscribe();

    let c = controller.clone();
    let status = tokio::task::spawn_blocking(move || c.start_preview(camera, mirror)).await?;
    println!("{status}");
    if status.is_failure() {
        anyhow::bail!("{status}");
    }

    if let Some(RecordingEvent::Error(message)) = watch_feed(&mut feed, &mut events, seconds).await {
        anyhow::bail!("Preview ended: {message}");
    }

    let c = controller.clone();
    let status = tokio::task::spawn_blocking(move || c.stop_preview()).await?;
    println!("{status}");
    Ok(())
}

/// Consume preview frames until Ctrl-C, the deadline, or the session ending
/// on its own; returns the event that ended it in the last case
async fn watch_feed(
    feed: &mut mpsc::Receiver<PreviewFrame>,
    events: &mut broadcast::Receiver<RecordingEvent>,
    seconds: Option<u64>,
) -> Option<RecordingEvent> {
    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut previews: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                return None;
            }
            _ = &mut deadline => return None,
            Some(frame) = feed.recv() => {
                previews += 1;
                tracing::trace!(
                    "{} ({:?} behind capture)",
                    frame.status,
                    frame.frame.captured_at().elapsed()
                );
                if previews % 100 == 0 {
                    tracing::info!("{}", frame.status);
                }
            }
            Ok(event) = events.recv() => match event {
                RecordingEvent::Stopped { reason, .. } if reason != StopReason::Requested => {
                    return Some(event);
                }
                RecordingEvent::Error(_) => return Some(event),
                _ => {}
            }
        }
    }
}
