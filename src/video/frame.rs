//! Decoded frame layout

use serde::{Deserialize, Serialize};

/// Bytes per pixel in the decoder's raw output
pub const CHANNELS: usize = 3;

/// Largest frame the reader will allocate for
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Dimensions of the raw pixel stream, agreed with the decoder out of band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            width: 960,
            height: 720,
        }
    }
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Bytes in one frame: `width * height * 3`, `None` on overflow
    pub fn checked_frame_size(&self) -> Option<usize> {
        self.width.checked_mul(self.height)?.checked_mul(CHANNELS)
    }

    /// Saturates at `usize::MAX` on overflow
    pub fn frame_size(&self) -> usize {
        self.checked_frame_size().unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.checked_frame_size() == Some(0)
    }

    /// Non-empty and no larger than [`MAX_FRAME_BYTES`]
    pub fn is_supported(&self) -> bool {
        matches!(self.checked_frame_size(), Some(size) if size > 0 && size <= MAX_FRAME_BYTES)
    }
}

/// One complete frame of interleaved pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    geometry: FrameGeometry,
    data: Vec<u8>,
}

impl DecodedFrame {
    /// Wraps `data`, or `None` when it cannot be a frame of `geometry`
    pub fn new(geometry: FrameGeometry, data: Vec<u8>) -> Option<Self> {
        if !geometry.is_supported() || data.len() != geometry.frame_size() {
            return None;
        }
        Some(Self { geometry, data })
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

}
