//! Per-connection streaming loop
//!
//! A [`ViewerStream`] waits for new-frame events, reads the latest viewer
//! frame and writes it as one multipart part. A failed write is the only way
//! a client is detected as gone; the loop then ends and its [`ViewerGuard`]
//! is dropped with it.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::hub::{Frame, FrameHub, FrameWatcher, ViewerGuard};

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Content type of the stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Headers preceding the payload of one part
pub fn part_header(len: usize) -> String {
    format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, len
    )
}

/// Write one complete part and flush it
pub async fn write_part<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(part_header(frame.len()).as_bytes()).await?;
    writer.write_all(frame.data()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Why a streaming loop ended
#[derive(Debug)]
pub enum StreamEnd {
    /// Writing to the client failed
    Disconnected(io::Error),
    /// Server shutdown was requested
    Shutdown,
    /// The frame notifier went away
    SourceClosed,
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Disconnected(e) => write!(f, "client disconnected ({})", e),
            StreamEnd::Shutdown => write!(f, "server shutdown"),
            StreamEnd::SourceClosed => write!(f, "frame source closed"),
        }
    }
}

/// Streaming loop state for one attached viewer
pub struct ViewerStream {
    id: u64,
    hub: Arc<FrameHub>,
    watcher: FrameWatcher,
    _guard: ViewerGuard,
    parts_sent: u64,
}

impl ViewerStream {
    /// Attach a viewer to `hub`, or `None` when `limit` viewers are attached
    pub fn attach(id: u64, hub: Arc<FrameHub>, limit: usize) -> Option<Self> {
        let (guard, watcher) = hub.attach_viewer(limit)?;
        Some(Self {
            id,
            hub,
            watcher,
            _guard: guard,
            parts_sent: 0,
        })
    }

    /// Stream parts into `writer` until it fails or `cancel` fires
    ///
    /// Consumes the stream, so the viewer is detached when this returns.
    pub async fn run<W>(mut self, mut writer: W, cancel: CancellationToken) -> StreamEnd
    where
        W: AsyncWrite + Unpin,
    {
        let end = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamEnd::Shutdown,
                changed = self.watcher.changed() => {
                    if !changed {
                        break StreamEnd::SourceClosed;
                    }
                }
            }

            // Nothing produced yet
            let Some(frame) = self.hub.store().read_viewer() else {
                continue;
            };

            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamEnd::Shutdown,
                written = write_part(&mut writer, &frame) => written,
            };

            if let Err(e) = written {
                break StreamEnd::Disconnected(e);
            }

            self.parts_sent += 1;
            self.hub.stats().record_part(frame.len());
        };

        tracing::debug!(viewer = self.id, parts = self.parts_sent, reason = %end, "Streaming loop ended");
        end
    }
}
