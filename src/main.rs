//! MJPEG streamer binary
//!
//! Run with: mjpeg-streamer [OPTIONS]
//!
//! Examples:
//!   mjpeg-streamer --device /dev/video0             # V4L2 camera (feature `v4l2`)
//!   mjpeg-streamer --device stub://pattern --fps 30 # synthetic test pattern
//!
//! View the stream at http://<host>:8080/stream. Commands are read from stdin,
//! one per line; JSON replies go to stdout and logs to stderr.
//!
//! Exit codes: 0 normal, 1 generic error, 2 capture device error.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use mjpeg_streamer::app::default_snapshot_path;
use mjpeg_streamer::capture::synthetic::{SyntheticDevice, SyntheticSource};
use mjpeg_streamer::capture::{self, CaptureConfig, FrameSender};
use mjpeg_streamer::command::{DeviceControl, DeviceError};
use mjpeg_streamer::pipeline::PipelineConfig;
use mjpeg_streamer::{
    Error, ExitStatus, JpegTranscoder, Resolution, ServerConfig, Streamer, StreamerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "mjpeg-streamer", version, about = "Camera MJPEG fan-out server")]
struct Args {
    /// Capture device path, or stub://<name> for a synthetic test pattern
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    /// Capture width (0 = largest MJPEG size the device offers)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Capture height (0 = largest MJPEG size the device offers)
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Capture buffer depth
    #[arg(long, default_value_t = 4)]
    buffers: usize,

    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// HTTP path of the multipart stream
    #[arg(long, default_value = "/stream")]
    stream_path: String,

    /// Maximum concurrent viewers (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_viewers: usize,

    /// Viewer frame width
    #[arg(long, default_value_t = 480)]
    viewer_width: u32,

    /// Viewer frame height
    #[arg(long, default_value_t = 270)]
    viewer_height: u32,

    /// Viewer JPEG quality (1-100)
    #[arg(long, default_value_t = 40)]
    quality: u8,

    /// Where CAPTURE saves the full-resolution frame [default: $HOME/Desktop/frame.jpeg]
    #[arg(long)]
    snapshot_path: Option<PathBuf>,

    /// Frame rate of the synthetic source
    #[arg(long, default_value_t = 15)]
    fps: u32,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mjpeg_streamer=info")),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitStatus::GenericError.into();
        }
    };

    let status = runtime.block_on(run(args));

    // A pending stdin read holds a blocking thread that never finishes on its own
    runtime.shutdown_timeout(Duration::from_millis(500));
    status.into()
}

async fn run(args: Args) -> ExitStatus {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let capture_config = CaptureConfig::default()
        .device(args.device.clone())
        .resolution(Resolution::new(args.width, args.height))
        .buffer_depth(args.buffers)
        .synthetic_fps(args.fps);

    let config = StreamerConfig::default()
        .server(
            ServerConfig::with_addr(args.listen)
                .stream_path(args.stream_path)
                .max_viewers(args.max_viewers),
        )
        .pipeline(
            PipelineConfig::default()
                .viewer_resolution(Resolution::new(args.viewer_width, args.viewer_height))
                .jpeg_quality(args.quality),
        )
        .snapshot_path(args.snapshot_path.unwrap_or_else(default_snapshot_path));

    tracing::info!(
        device = %capture_config.device,
        listen = %config.server.bind_addr,
        path = %config.server.stream_path,
        viewer_resolution = %config.pipeline.viewer_resolution,
        "MJPEG streamer starting"
    );

    let (frames_tx, frames_rx) = capture::channel(capture_config.buffer_depth);
    let device = match start_capture(&capture_config, frames_tx, cancel.clone()).await {
        Ok(device) => device,
        Err(Error::Device(DeviceError::Cancelled)) => {
            tracing::info!("Shutdown requested during capture startup");
            return ExitStatus::Normal;
        }
        Err(e) => {
            tracing::error!(error = %e, device = %capture_config.device, "Failed to start capture");
            return e.exit_status();
        }
    };

    let transcoder = Arc::new(JpegTranscoder::new(config.pipeline.jpeg_quality));
    let streamer = match Streamer::bind(config, transcoder, device).await {
        Ok(streamer) => streamer,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start stream server");
            return e.exit_status();
        }
    };

    tracing::info!("Listening for commands on stdin (CAPTURE, LIST, INFO, CONTROLS, SET_CONTROL <ID> <value>, STATS)");

    let commands = BufReader::new(tokio::io::stdin());
    streamer
        .run(frames_rx, commands, tokio::io::stdout(), cancel)
        .await
}

/// Start the capture backend selected by the device path
async fn start_capture(
    config: &CaptureConfig,
    frames: FrameSender,
    cancel: CancellationToken,
) -> Result<Arc<dyn DeviceControl>, Error> {
    if config.is_synthetic() {
        let source = SyntheticSource::new(config.resolution, config.synthetic_fps);
        let resolution = source.resolution();
        source
            .spawn(frames, cancel)
            .map_err(|e| DeviceError::Format(e.to_string()))?;
        return Ok(Arc::new(SyntheticDevice::new(&config.device, resolution)));
    }

    start_v4l2(config, frames, cancel).await
}

#[cfg(feature = "v4l2")]
async fn start_v4l2(
    config: &CaptureConfig,
    frames: FrameSender,
    cancel: CancellationToken,
) -> Result<Arc<dyn DeviceControl>, Error> {
    use mjpeg_streamer::capture::v4l2::{V4l2Capture, V4l2Control};

    let mut capture = V4l2Capture::open(config)?;
    let resolution = capture.negotiate_format()?;
    tracing::info!(device = %config.device, resolution = %resolution, "Capture format negotiated");

    // The capture thread stops on its own once the frame channel closes
    let _thread = capture.start(frames, cancel).await?;
    Ok(Arc::new(V4l2Control::new(&config.device)))
}

#[cfg(not(feature = "v4l2"))]
async fn start_v4l2(
    config: &CaptureConfig,
    _frames: FrameSender,
    _cancel: CancellationToken,
) -> Result<Arc<dyn DeviceControl>, Error> {
    Err(DeviceError::NotFound(format!(
        "{} (built without the v4l2 feature; use a stub:// device)",
        config.device
    ))
    .into())
}
