//! Pixel format and stream geometry definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

/// Supported pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// RGB24 format (3 bytes per pixel)
    Rgb24,
    /// RGBA format (4 bytes per pixel, alpha ignored by encoders)
    Rgba,
    /// YUV420 planar format (I420)
    Yuv420,
    /// NV12 semi-planar format (Y plane + interleaved UV)
    Nv12,
}

impl PixelFormat {
    /// Map a captured pixel depth (bytes per pixel) to a packed RGB layout
    pub fn from_depth(depth: u16) -> Option<Self> {
        match depth {
            3 => Some(PixelFormat::Rgb24),
            4 => Some(PixelFormat::Rgba),
            _ => None,
        }
    }

    /// Bytes per pixel for packed formats, None for planar ones
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgb24 => Some(3),
            PixelFormat::Rgba => Some(4),
            PixelFormat::Yuv420 | PixelFormat::Nv12 => None,
        }
    }

    /// Check if this is a planar YUV format
    pub fn is_yuv(&self) -> bool {
        matches!(self, PixelFormat::Yuv420 | PixelFormat::Nv12)
    }

    /// Expected frame size in bytes for a given resolution
    pub fn frame_size(&self, resolution: Resolution) -> usize {
        let pixels = resolution.pixels() as usize;
        match self {
            PixelFormat::Rgb24 => pixels * 3,
            PixelFormat::Rgba => pixels * 4,
            PixelFormat::Yuv420 | PixelFormat::Nv12 => pixels + pixels / 2,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Yuv420 => "YUV420",
            PixelFormat::Nv12 => "NV12",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RGB24" | "RGB" => Ok(PixelFormat::Rgb24),
            "RGBA" | "RGBA32" => Ok(PixelFormat::Rgba),
            "YUV420" | "YUV420P" | "I420" => Ok(PixelFormat::Yuv420),
            "NV12" => Ok(PixelFormat::Nv12),
            _ => Err(format!("Unknown pixel format: {}", s)),
        }
    }
}

/// Round a dimension up to the nearest even value.
///
/// `u32::MAX` is the only odd value that cannot be rounded up; it rounds
/// down instead so the result is always even.
pub fn round_up_even(value: u32) -> u32 {
    value.checked_add(value & 1).unwrap_or(value - 1)
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Get total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Both dimensions rounded up to even values (encoder requirement)
    pub fn to_even(&self) -> Self {
        Self {
            width: round_up_even(self.width),
            height: round_up_even(self.height),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const HD720: Resolution = Resolution {
        width: 1280,
        height: 720,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Geometry of a captured frame: size plus bytes per pixel.
///
/// Equality compares all three fields, so a depth change alone is enough to
/// force a stream reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFormat {
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u16,
}

impl StreamFormat {
    pub fn new(width: u32, height: u32, pixel_depth: u16) -> Self {
        Self {
            width,
            height,
            pixel_depth,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Resolution handed to the encoder backend
    pub fn encoded_resolution(&self) -> Resolution {
        self.resolution().to_even()
    }

    /// Source pixel layout implied by the depth
    pub fn pixel_format(&self) -> Result<PixelFormat> {
        PixelFormat::from_depth(self.pixel_depth).ok_or_else(|| {
            AppError::ConversionFailed(format!(
                "unsupported pixel depth {} (expected 3 or 4)",
                self.pixel_depth
            ))
        })
    }

    /// Raw buffer size a frame of this format must have
    pub fn frame_size(&self) -> usize {
        self.resolution().pixels() as usize * self.pixel_depth as usize
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.pixel_depth)
    }
}
