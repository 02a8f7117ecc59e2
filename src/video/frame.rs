//! Captured frame data structures

use bytes::Bytes;
use std::time::Instant;

use super::format::{PixelFormat, Resolution, StreamFormat};

/// A raw frame pulled from a capture source
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw packed pixel data (RGB24 or RGBA, tightly packed rows)
    data: Bytes,
    /// Frame geometry
    pub format: StreamFormat,
    /// Capture sequence number (per source)
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub capture_ts: Instant,
}

impl VideoFrame {
    /// Create a new video frame
    pub fn new(data: Bytes, format: StreamFormat, sequence: u64) -> Self {
        Self {
            data,
            format,
            sequence,
            capture_ts: Instant::now(),
        }
    }

    /// Create a frame from a Vec<u8>
    pub fn from_vec(data: Vec<u8>, format: StreamFormat, sequence: u64) -> Self {
        Self::new(Bytes::from(data), format, sequence)
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.format.width
    }

    pub fn height(&self) -> u32 {
        self.format.height
    }

    pub fn depth(&self) -> u16 {
        self.format.pixel_depth
    }

    pub fn resolution(&self) -> Resolution {
        self.format.resolution()
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_depth(self.format.pixel_depth)
    }

    /// Whether the buffer length matches `width * height * depth`
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.format.frame_size()
    }

    /// Get age of this frame (time since capture)
    pub fn age(&self) -> std::time::Duration {
        self.capture_ts.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed() {
        let format = StreamFormat::new(2, 2, 3);
        let frame = VideoFrame::from_vec(vec![0; 12], format, 0);
        assert!(frame.is_well_formed());
        assert_eq!(frame.pixel_format(), Some(PixelFormat::Rgb24));

        let short = VideoFrame::from_vec(vec![0; 11], format, 1);
        assert!(!short.is_well_formed());
    }
}
