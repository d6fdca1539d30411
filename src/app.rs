//! Process orchestration
//!
//! [`Streamer`] wires the frame hub to its three long-lived activities and
//! turns whichever of them ends first into an [`ExitStatus`]:
//!
//! ```text
//!   FrameReceiver ──► Producer ──► FrameHub ◄── StreamServer ──► viewers
//!                                     ▲
//!   commands ──► CommandDispatcher ───┘──► replies
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::capture::FrameReceiver;
use crate::command::{CommandDispatcher, DeviceControl};
use crate::error::{ExitStatus, Result};
use crate::hub::FrameHub;
use crate::pipeline::{PipelineConfig, Producer};
use crate::server::{ServerConfig, StreamServer};
use crate::transcode::Transcode;

/// How long open viewer connections get to drain after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Snapshot destination used when none is configured: `$HOME/Desktop/frame.jpeg`
pub fn default_snapshot_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("Desktop")
        .join("frame.jpeg")
}

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    /// Where `CAPTURE` writes the full-resolution frame
    pub snapshot_path: PathBuf,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl StreamerConfig {
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }
}

/// A bound, ready-to-run streamer
pub struct Streamer {
    hub: Arc<FrameHub>,
    server: StreamServer,
    producer: Producer,
    dispatcher: CommandDispatcher,
}

impl Streamer {
    /// Build the hub and bind the HTTP listener
    pub async fn bind(
        config: StreamerConfig,
        transcoder: Arc<dyn Transcode>,
        device: Arc<dyn DeviceControl>,
    ) -> Result<Self> {
        let hub = Arc::new(FrameHub::new());
        let server = StreamServer::bind(config.server, Arc::clone(&hub)).await?;
        let producer = Producer::new(Arc::clone(&hub), transcoder, &config.pipeline);
        let dispatcher = CommandDispatcher::new(Arc::clone(&hub), device, config.snapshot_path);

        Ok(Self {
            hub,
            server,
            producer,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn hub(&self) -> Arc<FrameHub> {
        Arc::clone(&self.hub)
    }

    /// Run production, serving and command handling until one of them ends
    ///
    /// - capture stream ended: [`ExitStatus::DeviceError`]
    /// - server failure or unwritable replies: [`ExitStatus::GenericError`]
    /// - end of command input or `cancel`: [`ExitStatus::Normal`]
    ///
    /// `cancel` is fired before returning, which stops every viewer stream.
    pub async fn run<R, W>(
        self,
        frames: FrameReceiver,
        commands: R,
        replies: W,
        cancel: CancellationToken,
    ) -> ExitStatus
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Streamer {
            server,
            producer,
            dispatcher,
            ..
        } = self;

        let mut server = tokio::spawn(server.run_until(cancel.clone()));
        let mut server_done = false;

        let status = tokio::select! {
            result = producer.run(frames, cancel.clone()) => match result {
                Ok(()) => ExitStatus::Normal,
                Err(e) => {
                    tracing::error!(error = %e, "Frame production stopped");
                    e.exit_status()
                }
            },
            result = &mut server => {
                server_done = true;
                match result {
                    Ok(Ok(())) => ExitStatus::Normal,
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Stream server failed");
                        e.exit_status()
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Stream server task aborted");
                        ExitStatus::GenericError
                    }
                }
            },
            result = dispatcher.run(commands, replies, cancel.clone()) => match result {
                Ok(()) => ExitStatus::Normal,
                Err(e) => {
                    tracing::error!(error = %e, "Command channel failed");
                    ExitStatus::GenericError
                }
            },
        };

        cancel.cancel();

        if !server_done && tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
            tracing::warn!("Viewers did not drain before shutdown deadline");
        }

        tracing::info!(exit_code = status.code(), "Streamer stopped");
        status
    }
}
