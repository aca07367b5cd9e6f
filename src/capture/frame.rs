use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::SourceError;

/// One raw sensor frame, tightly packed (no row padding).
#[derive(Clone)]
pub struct Frame {
    /// Pixel data - shares the SDK's copy, never written in place
    pub data: Bytes,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    /// 16-bit little-endian depth samples (Z16)
    Gray16Le,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Gray16Le => 2,
        }
    }

    /// Name used in GStreamer `video/x-raw` caps.
    pub const fn caps_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB",
            PixelFormat::Bgr24 => "BGR",
            PixelFormat::Gray16Le => "GRAY16_LE",
        }
    }

    /// Byte length of a packed `width` x `height` image.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

impl Frame {
    /// Build a frame, rejecting buffers that don't match the dimensions.
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self, SourceError> {
        let data = data.into();
        let expected = format.frame_len(width, height);
        if data.len() != expected {
            return Err(SourceError::InvalidFrame(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data,
            meta: FrameMetadata {
                sequence,
                width,
                height,
                format,
                device_timestamp: None,
            },
            timestamp: Instant::now(),
        })
    }

    pub fn with_device_timestamp(mut self, ts: Option<Duration>) -> Self {
        self.meta.device_timestamp = ts;
        self
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Copy `height` rows of `row_bytes` out of a buffer whose rows are `stride`
/// bytes apart. Returns `None` when the buffer is too short.
pub fn pack_rows(data: &[u8], stride: usize, row_bytes: usize, height: usize) -> Option<Vec<u8>> {
    if stride < row_bytes {
        return None;
    }
    if height > 0 && data.len() < stride * (height - 1) + row_bytes {
        return None;
    }

    let mut packed = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        packed.extend_from_slice(&data[start..start + row_bytes]);
    }
    Some(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_must_match_format() {
        assert!(Frame::new(vec![0u8; 4 * 2 * 3], 4, 2, PixelFormat::Rgb24, 0).is_ok());
        assert!(Frame::new(vec![0u8; 4 * 2 * 2], 4, 2, PixelFormat::Gray16Le, 0).is_ok());

        let err = Frame::new(vec![0u8; 10], 4, 2, PixelFormat::Rgb24, 0).unwrap_err();
        assert!(matches!(err, SourceError::InvalidFrame(_)));
    }

    #[test]
    fn padded_rows_are_packed() {
        // 2x2 RGB rows padded to 8 bytes
        let data = [1, 2, 3, 4, 5, 6, 0, 0, 7, 8, 9, 10, 11, 12, 0, 0];
        let packed = pack_rows(&data, 8, 6, 2).unwrap();
        assert_eq!(packed, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

        assert!(pack_rows(&data[..10], 8, 6, 2).is_none());
        assert!(pack_rows(&data, 4, 6, 2).is_none());
    }
}
