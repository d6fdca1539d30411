//! Viewer-resolution transcoding
//!
//! [`Transcode`] turns a full-resolution JPEG into a smaller JPEG. The
//! production loop decides when it runs; implementations only decide how.

use std::fmt;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, ImageFormat};

/// Default JPEG quality of viewer frames
pub const DEFAULT_QUALITY: u8 = 40;

/// Error type for a single failed transcode
#[derive(Debug)]
pub enum TranscodeError {
    /// Input could not be decoded
    Decode(String),
    /// Output could not be encoded
    Encode(String),
    /// Transcode task was cancelled or panicked
    Aborted(String),
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::Decode(msg) => write!(f, "decode error: {}", msg),
            TranscodeError::Encode(msg) => write!(f, "encode error: {}", msg),
            TranscodeError::Aborted(msg) => write!(f, "transcode aborted: {}", msg),
        }
    }
}

impl std::error::Error for TranscodeError {}

/// Rescale a compressed frame to fit a target box
///
/// Called from a blocking thread, never from the async executor.
pub trait Transcode: Send + Sync + 'static {
    fn transcode(&self, jpeg: &[u8], width: u32, height: u32) -> Result<Bytes, TranscodeError>;
}

/// JPEG decode, downscale and re-encode via the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct JpegTranscoder {
    quality: u8,
}

impl JpegTranscoder {
    /// Transcoder encoding at `quality` (1-100)
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl Transcode for JpegTranscoder {
    fn transcode(&self, jpeg: &[u8], width: u32, height: u32) -> Result<Bytes, TranscodeError> {
        let image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|e| TranscodeError::Decode(e.to_string()))?;

        // Fits within the box, keeping the aspect ratio; never upscales
        let scaled = if image.width() > width || image.height() > height {
            image.thumbnail(width, height)
        } else {
            image
        };
        let rgb = scaled.to_rgb8();

        let mut out = Vec::with_capacity(rgb.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(&rgb)
            .map_err(|e: ImageError| TranscodeError::Encode(e.to_string()))?;

        Ok(Bytes::from(out))
    }
}
