//! V4L2 capture backend
//!
//! Opens a Video4Linux2 device, negotiates Motion-JPEG at the requested (or
//! largest available) resolution and runs an mmap stream on a dedicated
//! thread. Each dequeued buffer is copied into a [`CapturedFrame`], which
//! hands the driver buffer back on the next dequeue. A dequeue error ends
//! the thread and with it the frame stream.

use std::path::{Path, PathBuf};
use std::thread;

use bytes::Bytes;
use tokio::sync::oneshot;
use v4l::buffer::Type;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use tokio_util::sync::CancellationToken;

use super::{wait_started, CaptureConfig, CapturedFrame, FrameSender, START_TIMEOUT};
use crate::command::device::{
    ControlDescriptor, DeviceControl, DeviceError, DeviceInfo, DeviceSummary, FormatDescriptor,
    FrameSize,
};
use crate::hub::Resolution;

const MJPEG: [u8; 4] = *b"MJPG";

/// An opened, not yet streaming, capture device
pub struct V4l2Capture {
    device: Device,
    path: String,
    buffer_depth: u32,
    resolution: Resolution,
}

impl V4l2Capture {
    /// Open the device named in `config`
    pub fn open(config: &CaptureConfig) -> Result<Self, DeviceError> {
        let device =
            Device::with_path(&config.device).map_err(|e| DeviceError::open(&config.device, e))?;

        tracing::info!(
            device = %config.device,
            buffers = config.buffer_depth,
            "Capture device opened"
        );

        Ok(Self {
            device,
            path: config.device.clone(),
            buffer_depth: config.buffer_depth as u32,
            resolution: config.resolution,
        })
    }

    /// Select Motion-JPEG at the configured resolution
    ///
    /// With no resolution configured the largest MJPEG frame size is used.
    /// Returns the resolution the driver actually accepted.
    pub fn negotiate_format(&mut self) -> Result<Resolution, DeviceError> {
        let requested = if self.resolution.is_unset() {
            let best = best_mjpeg_resolution(&self.device)?;
            tracing::info!(resolution = %best, "Auto-detected MJPEG resolution");
            best
        } else {
            self.resolution
        };

        let mut format = self.device.format()?;
        format.width = requested.width;
        format.height = requested.height;
        format.fourcc = FourCC::new(&MJPEG);

        let actual = self.device.set_format(&format)?;
        if actual.fourcc != FourCC::new(&MJPEG) {
            return Err(DeviceError::Format(format!(
                "driver selected {} instead of MJPG",
                actual.fourcc
            )));
        }

        self.resolution = Resolution::new(actual.width, actual.height);
        tracing::info!(resolution = %self.resolution, "Capture format set");
        Ok(self.resolution)
    }

    /// Start streaming into `sender` on a capture thread
    ///
    /// Resolves once the first buffer was dequeued, or with the error that
    /// prevented the stream from starting. Gives up after [`START_TIMEOUT`]
    /// or when `cancel` fires.
    pub async fn start(
        self,
        sender: FrameSender,
        cancel: CancellationToken,
    ) -> Result<thread::JoinHandle<()>, DeviceError> {
        let (started_tx, started_rx) = oneshot::channel();
        let Self {
            device,
            path,
            buffer_depth,
            ..
        } = self;

        let handle = thread::Builder::new()
            .name("v4l2-capture".to_string())
            .spawn(move || capture_thread(device, path, buffer_depth, sender, started_tx))?;

        wait_started(started_rx, cancel, START_TIMEOUT).await?;
        Ok(handle)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

fn capture_thread(
    device: Device,
    path: String,
    buffer_depth: u32,
    sender: FrameSender,
    started: oneshot::Sender<std::io::Result<()>>,
) {
    let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, buffer_depth) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = started.send(Err(e));
            return;
        }
    };

    // The stream is started lazily by the first dequeue
    let mut started = Some(started);
    let mut frames = 0u64;

    loop {
        let frame = match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                CapturedFrame::new(Bytes::copy_from_slice(&buf[..used]))
            }
            Err(e) => {
                match started.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e));
                    }
                    None => {
                        tracing::error!(device = %path, error = %e, frames, "Capture stream failed");
                    }
                }
                return;
            }
        };

        if let Some(tx) = started.take() {
            tracing::info!(device = %path, "Capture stream started");
            let _ = tx.send(Ok(()));
        }

        if sender.blocking_send(frame).is_err() {
            tracing::debug!(device = %path, frames, "Frame receiver closed, stopping capture");
            return;
        }
        frames += 1;
    }
}

fn best_mjpeg_resolution(device: &Device) -> Result<Resolution, DeviceError> {
    let sizes = device.enum_framesizes(FourCC::new(&MJPEG))?;

    sizes
        .iter()
        .map(|size| match &size.size {
            FrameSizeEnum::Discrete(d) => Resolution::new(d.width, d.height),
            FrameSizeEnum::Stepwise(s) => Resolution::new(s.max_width, s.max_height),
        })
        .filter(|r| !r.is_unset())
        .max_by_key(Resolution::pixels)
        .ok_or_else(|| DeviceError::Format("no MJPEG resolutions available".to_string()))
}

/// V4L2 introspection and control
///
/// Opens the device node per call; V4L2 allows control access alongside an
/// active capture stream.
#[derive(Debug, Clone)]
pub struct V4l2Control {
    path: PathBuf,
}

impl V4l2Control {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<Device, DeviceError> {
        Device::with_path(&self.path).map_err(|e| DeviceError::open(self.path.display(), e))
    }
}

fn summarize(path: &Path) -> Result<DeviceSummary, DeviceError> {
    let device = Device::with_path(path)?;
    let caps = device.query_caps()?;
    Ok(DeviceSummary {
        path: path.to_path_buf(),
        card: caps.card,
        driver: caps.driver,
        bus: caps.bus,
    })
}

fn describe_controls(device: &Device) -> Result<Vec<ControlDescriptor>, DeviceError> {
    Ok(device
        .query_controls()?
        .into_iter()
        .map(|c| ControlDescriptor {
            id: c.id,
            name: c.name,
            kind: format!("{:?}", c.typ),
            minimum: c.minimum,
            maximum: c.maximum,
            step: c.step,
            default: c.default,
        })
        .collect())
}

impl DeviceControl for V4l2Control {
    fn list_devices(&self) -> Result<Vec<DeviceSummary>, DeviceError> {
        let mut devices = Vec::new();
        for node in v4l::context::enum_devices() {
            match summarize(node.path()) {
                Ok(summary) => devices.push(summary),
                Err(e) => {
                    tracing::warn!(device = %node.path().display(), error = %e, "Unable to open device")
                }
            }
        }
        Ok(devices)
    }

    fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        let device = self.open()?;
        let caps = device.query_caps()?;

        let mut formats = Vec::new();
        for desc in device.enum_formats()? {
            let sizes = device
                .enum_framesizes(desc.fourcc)
                .unwrap_or_default()
                .into_iter()
                .map(|size| match size.size {
                    FrameSizeEnum::Discrete(d) => FrameSize {
                        width: d.width,
                        height: d.height,
                    },
                    FrameSizeEnum::Stepwise(s) => FrameSize {
                        width: s.max_width,
                        height: s.max_height,
                    },
                })
                .collect();

            formats.push(FormatDescriptor {
                fourcc: desc.fourcc.to_string(),
                description: desc.description,
                sizes,
            });
        }

        Ok(DeviceInfo {
            path: self.path.clone(),
            card: caps.card,
            driver: caps.driver,
            formats,
            controls: describe_controls(&device)?,
        })
    }

    fn controls(&self) -> Result<Vec<ControlDescriptor>, DeviceError> {
        describe_controls(&self.open()?)
    }

    fn set_control(&self, id: u32, value: i32) -> Result<(), DeviceError> {
        let device = self.open()?;
        device.set_control(v4l::control::Control {
            id,
            value: v4l::control::Value::Integer(value as i64),
        })?;
        Ok(())
    }
}
