//! Capture configuration

use crate::hub::Resolution;

/// Prefix selecting the synthetic capture backend
pub const SYNTHETIC_PREFIX: &str = "stub://";

/// Capture device options
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device path (e.g. "/dev/video0", or "stub://..." for the test pattern)
    pub device: String,

    /// Requested capture resolution (0x0 = pick the largest MJPEG size)
    pub resolution: Resolution,

    /// Number of driver buffers, also the frame channel depth
    pub buffer_depth: usize,

    /// Frame rate of the synthetic source
    pub synthetic_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            resolution: Resolution::new(0, 0),
            buffer_depth: 4,
            synthetic_fps: 15,
        }
    }
}

impl CaptureConfig {
    /// Set the device path
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Request a capture resolution
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the buffer depth (at least 1)
    pub fn buffer_depth(mut self, depth: usize) -> Self {
        self.buffer_depth = depth.max(1);
        self
    }

    /// Set the synthetic source frame rate (at least 1)
    pub fn synthetic_fps(mut self, fps: u32) -> Self {
        self.synthetic_fps = fps.max(1);
        self
    }

    /// Whether the synthetic backend should be used
    pub fn is_synthetic(&self) -> bool {
        self.device.starts_with(SYNTHETIC_PREFIX)
    }
}
