//! Camera MJPEG fan-out server
//!
//! Ingests compressed frames from a capture source, keeps the latest frame at
//! full and viewer resolution, and streams viewer frames to any number of HTTP
//! clients as `multipart/x-mixed-replace`. Viewer frames are only produced
//! while at least one viewer is attached. A line-oriented command channel
//! handles snapshots and device control.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mjpeg_streamer::capture::{self, synthetic::{SyntheticDevice, SyntheticSource}};
//! use mjpeg_streamer::hub::Resolution;
//! use mjpeg_streamer::{JpegTranscoder, Streamer, StreamerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> mjpeg_streamer::Result<()> {
//! let cancel = CancellationToken::new();
//! let (tx, rx) = capture::channel(4);
//! let source = SyntheticSource::new(Resolution::new(1280, 720), 15);
//! let device = Arc::new(SyntheticDevice::new("stub://demo", source.resolution()));
//! source
//!     .spawn(tx, cancel.clone())
//!     .map_err(|e| mjpeg_streamer::Error::Config(e.to_string()))?;
//!
//! let streamer = Streamer::bind(
//!     StreamerConfig::default(),
//!     Arc::new(JpegTranscoder::default()),
//!     device,
//! )
//! .await?;
//!
//! let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//! let status = streamer.run(rx, stdin, tokio::io::stdout(), cancel).await;
//! std::process::exit(status.code().into());
//! # }
//! ```

pub mod app;
pub mod capture;
pub mod command;
pub mod error;
pub mod hub;
pub mod pipeline;
pub mod server;
pub mod stats;
pub mod transcode;

pub use app::{Streamer, StreamerConfig};
pub use error::{Error, ExitStatus, Result};
pub use hub::{Frame, FrameHub, Resolution};
pub use server::ServerConfig;
pub use transcode::{JpegTranscoder, Transcode};
