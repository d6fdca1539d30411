//! Pipeline configuration

use crate::hub::Resolution;
use crate::transcode::DEFAULT_QUALITY;

/// Production loop options
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Target box for viewer frames
    pub viewer_resolution: Resolution,

    /// JPEG quality of viewer frames
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            viewer_resolution: Resolution::VIEWER_DEFAULT,
            jpeg_quality: DEFAULT_QUALITY,
        }
    }
}

impl PipelineConfig {
    /// Set the viewer resolution
    pub fn viewer_resolution(mut self, resolution: Resolution) -> Self {
        self.viewer_resolution = resolution;
        self
    }

    /// Set the viewer JPEG quality
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}
