//! Frame payload type
//!
//! A [`Frame`] is one compressed image. The hub never looks inside it; which
//! resolution it represents is implied by the slot it occupies.

use bytes::Bytes;

/// One compressed image
///
/// Cheap to clone: the payload is a reference-counted immutable buffer, so
/// readers share the allocation and can never observe a partial write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wrap a payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Width and height of an image in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Default viewer resolution (480x270)
    pub const VIEWER_DEFAULT: Resolution = Resolution::new(480, 270);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero
    pub fn is_unset(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel count
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_clone_shares_payload() {
        let frame = Frame::new(vec![1u8, 2, 3]);
        let copy = frame.clone();

        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
        assert_eq!(copy.len(), 3);
    }

    #[test]
    fn test_resolution_unset() {
        assert!(Resolution::new(0, 270).is_unset());
        assert!(!Resolution::VIEWER_DEFAULT.is_unset());
        assert_eq!(Resolution::new(1920, 1080).to_string(), "1920x1080");
    }
}
