//! Synthetic capture backend
//!
//! Generates a moving test pattern as JPEG frames for `stub://` device paths,
//! so the server can run and be tested without camera hardware.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{CapturedFrame, FrameSender};
use crate::command::device::{
    ControlDescriptor, DeviceControl, DeviceError, DeviceInfo, DeviceSummary, FormatDescriptor,
    FrameSize,
};
use crate::hub::Resolution;

/// Capture resolution used when none was requested
pub const DEFAULT_RESOLUTION: Resolution = Resolution::new(1280, 720);

/// Distinct pattern frames rendered up front and cycled through
const PATTERN_PHASES: u32 = 32;

/// Test pattern frame generator
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    resolution: Resolution,
    fps: u32,
    frame_limit: Option<u64>,
}

impl SyntheticSource {
    /// Create a source producing `fps` frames per second
    pub fn new(resolution: Resolution, fps: u32) -> Self {
        let resolution = if resolution.is_unset() {
            DEFAULT_RESOLUTION
        } else {
            resolution
        };

        Self {
            resolution,
            fps: fps.max(1),
            frame_limit: None,
        }
    }

    /// End the stream after `frames` frames, as if the device was unplugged
    pub fn frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Render the pattern and start delivering frames into `sender`
    pub fn spawn(
        self,
        sender: FrameSender,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, ImageError> {
        let frames = (0..PATTERN_PHASES)
            .map(|phase| render_test_pattern(self.resolution, phase))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            resolution = %self.resolution,
            fps = self.fps,
            "Synthetic capture started"
        );

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1) / self.fps);
            let mut delivered = 0u64;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let data = frames[(delivered % frames.len() as u64) as usize].clone();
                if sender.send(CapturedFrame::new(data)).await.is_err() {
                    break;
                }
                delivered += 1;

                if self.frame_limit.is_some_and(|limit| delivered >= limit) {
                    tracing::info!(frames = delivered, "Synthetic capture reached frame limit");
                    break;
                }
            }

            tracing::debug!(frames = delivered, "Synthetic capture stopped");
        }))
    }
}

/// Render one phase of the test pattern as a JPEG
///
/// Vertical colour bars with a white bar sweeping across as `phase` grows.
pub fn render_test_pattern(resolution: Resolution, phase: u32) -> Result<Bytes, ImageError> {
    const BARS: [[u8; 3]; 7] = [
        [192, 192, 192],
        [192, 192, 0],
        [0, 192, 192],
        [0, 192, 0],
        [192, 0, 192],
        [192, 0, 0],
        [0, 0, 192],
    ];

    let Resolution { width, height } = resolution;
    let sweep = (width as u64 * (phase % PATTERN_PHASES) as u64 / PATTERN_PHASES as u64) as u32;
    let sweep_width = (width / PATTERN_PHASES).max(1);

    let image = RgbImage::from_fn(width, height, |x, _y| {
        if x >= sweep && x < sweep + sweep_width {
            Rgb([255, 255, 255])
        } else {
            Rgb(BARS[(x as usize * BARS.len()) / width as usize])
        }
    });

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 85).encode_image(&image)?;
    Ok(Bytes::from(out))
}

/// In-memory device control for the synthetic source
#[derive(Debug)]
pub struct SyntheticDevice {
    path: PathBuf,
    resolution: Resolution,
    controls: Vec<ControlDescriptor>,
    values: Mutex<BTreeMap<u32, i32>>,
}

impl SyntheticDevice {
    pub fn new(path: impl Into<PathBuf>, resolution: Resolution) -> Self {
        let controls = vec![
            control(0x0098_0900, "Brightness", 0, 255, 128),
            control(0x0098_0901, "Contrast", 0, 255, 32),
            control(0x0098_0902, "Saturation", 0, 255, 64),
        ];
        let values = controls
            .iter()
            .map(|c| (c.id, c.default as i32))
            .collect();

        Self {
            path: path.into(),
            resolution,
            controls,
            values: Mutex::new(values),
        }
    }

    /// Current value of a control
    pub fn control_value(&self, id: u32) -> Option<i32> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }

    fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            path: self.path.clone(),
            card: "Synthetic Test Pattern".to_string(),
            driver: "synthetic".to_string(),
            bus: "virtual".to_string(),
        }
    }
}

fn control(id: u32, name: &str, minimum: i64, maximum: i64, default: i64) -> ControlDescriptor {
    ControlDescriptor {
        id,
        name: name.to_string(),
        kind: "Integer".to_string(),
        minimum,
        maximum,
        step: 1,
        default,
    }
}

impl DeviceControl for SyntheticDevice {
    fn list_devices(&self) -> Result<Vec<DeviceSummary>, DeviceError> {
        Ok(vec![self.summary()])
    }

    fn device_info(&self) -> Result<DeviceInfo, DeviceError> {
        let summary = self.summary();
        Ok(DeviceInfo {
            path: summary.path,
            card: summary.card,
            driver: summary.driver,
            formats: vec![FormatDescriptor {
                fourcc: "MJPG".to_string(),
                description: "Motion-JPEG".to_string(),
                sizes: vec![FrameSize {
                    width: self.resolution.width,
                    height: self.resolution.height,
                }],
            }],
            controls: self.controls.clone(),
        })
    }

    fn controls(&self) -> Result<Vec<ControlDescriptor>, DeviceError> {
        Ok(self.controls.clone())
    }

    fn set_control(&self, id: u32, value: i32) -> Result<(), DeviceError> {
        let descriptor = self
            .controls
            .iter()
            .find(|c| c.id == id)
            .ok_or(DeviceError::UnknownControl(id))?;

        if (value as i64) < descriptor.minimum || (value as i64) > descriptor.maximum {
            return Err(DeviceError::OutOfRange { id, value });
        }

        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture;

    #[test]
    fn test_pattern_is_jpeg() {
        let jpeg = render_test_pattern(Resolution::new(64, 36), 3).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 36);
    }

    #[test]
    fn test_unset_resolution_uses_default() {
        let source = SyntheticSource::new(Resolution::new(0, 0), 10);
        assert_eq!(source.resolution(), DEFAULT_RESOLUTION);
    }

    #[tokio::test]
    async fn test_frame_limit_ends_stream() {
        let (tx, mut rx) = capture::channel(4);
        let handle = SyntheticSource::new(Resolution::new(32, 18), 200)
            .frame_limit(3)
            .spawn(tx, CancellationToken::new())
            .unwrap();

        let mut received = 0;
        while let Some(frame) = rx.recv().await {
            assert!(!frame.is_empty());
            received += 1;
        }

        assert_eq!(received, 3);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_source() {
        let (tx, mut rx) = capture::channel(4);
        let cancel = CancellationToken::new();
        let handle = SyntheticSource::new(Resolution::new(32, 18), 100)
            .spawn(tx, cancel.clone())
            .unwrap();

        assert!(rx.recv().await.is_some());
        cancel.cancel();
        handle.await.unwrap();

        while rx.recv().await.is_some() {}
    }

    #[test]
    fn test_synthetic_set_control() {
        let device = SyntheticDevice::new("stub://test", Resolution::new(640, 480));

        device.set_control(0x0098_0900, 200).unwrap();
        assert_eq!(device.control_value(0x0098_0900), Some(200));

        assert!(matches!(
            device.set_control(42, 1),
            Err(DeviceError::UnknownControl(42))
        ));
        assert!(matches!(
            device.set_control(0x0098_0900, 1_000),
            Err(DeviceError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_synthetic_info() {
        let device = SyntheticDevice::new("stub://test", Resolution::new(640, 480));
        let info = device.device_info().unwrap();

        assert_eq!(info.formats[0].fourcc, "MJPG");
        assert_eq!(info.formats[0].sizes[0].width, 640);
        assert_eq!(info.controls.len(), 3);
    }
}
