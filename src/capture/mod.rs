//! Capture source boundary
//!
//! A capture backend pushes [`CapturedFrame`]s into a bounded channel; the
//! production loop pulls them out of the [`FrameReceiver`]. When every
//! [`FrameSender`] is gone the receiver reports end-of-stream, which the
//! pipeline treats as loss of the capture device.
//!
//! Backends:
//! - [`synthetic`]: generated test pattern for `stub://` device paths
//! - `v4l2`: Video4Linux2 devices (cargo feature `v4l2`)

pub mod config;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use config::CaptureConfig;

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::command::DeviceError;

/// How long a started device may take to deliver its first frame
pub const START_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback returning a frame's backing buffer to its source
pub struct ReleaseHandle(Box<dyn FnOnce() + Send>);

impl ReleaseHandle {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(release))
    }
}

impl std::fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReleaseHandle")
    }
}

/// One compressed frame as delivered by a capture backend
///
/// Owns an optional [`ReleaseHandle`] that runs exactly once, when the frame
/// is dropped or explicitly released.
#[derive(Debug)]
pub struct CapturedFrame {
    data: Bytes,
    release: Option<ReleaseHandle>,
}

impl CapturedFrame {
    /// Frame whose payload needs no release
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            release: None,
        }
    }

    /// Frame that returns a source-owned buffer when dropped
    pub fn with_release(data: impl Into<Bytes>, release: ReleaseHandle) -> Self {
        Self {
            data: data.into(),
            release: Some(release),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return the backing buffer now
    pub fn release(self) {}
}

impl Drop for CapturedFrame {
    fn drop(&mut self) {
        if let Some(ReleaseHandle(release)) = self.release.take() {
            release();
        }
    }
}

/// Create a frame channel holding at most `depth` undelivered frames
pub fn channel(depth: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (FrameSender { tx }, FrameReceiver { rx })
}

/// The consumer dropped its receiver; no more frames can be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverClosed;

impl std::fmt::Display for ReceiverClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame receiver closed")
    }
}

impl std::error::Error for ReceiverClosed {}

/// Backend side of the frame channel
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<CapturedFrame>,
}

impl FrameSender {
    /// Deliver a frame, waiting while the channel is full
    pub async fn send(&self, frame: CapturedFrame) -> Result<(), ReceiverClosed> {
        self.tx.send(frame).await.map_err(|_| ReceiverClosed)
    }

    /// Deliver a frame from a non-async capture thread
    ///
    /// Must not be called from within an async context.
    pub fn blocking_send(&self, frame: CapturedFrame) -> Result<(), ReceiverClosed> {
        self.tx.blocking_send(frame).map_err(|_| ReceiverClosed)
    }

    /// Whether the consumer is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Pipeline side of the frame channel
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<CapturedFrame>,
}

impl FrameReceiver {
    /// Next frame, or `None` once every sender has been dropped
    pub async fn recv(&mut self) -> Option<CapturedFrame> {
        self.rx.recv().await
    }
}

/// Wait for a capture thread to report its first dequeue
#[cfg_attr(not(feature = "v4l2"), allow(dead_code))]
pub(crate) async fn wait_started(
    started: oneshot::Receiver<io::Result<()>>,
    cancel: CancellationToken,
    limit: Duration,
) -> Result<(), DeviceError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeviceError::Cancelled),
        result = tokio::time::timeout(limit, started) => match result {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(DeviceError::Io(e)),
            // Thread exited without reporting
            Ok(Err(_)) => Err(DeviceError::NotOpen),
            Err(_) => Err(DeviceError::StartTimeout(limit)),
        },
    }
}
