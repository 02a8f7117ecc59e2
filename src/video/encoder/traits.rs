//! Encoder traits and common types

use bytes::Bytes;
use std::time::Instant;

use super::options::{EncoderSettings, EncodingOptions};
use crate::error::Result;
use crate::video::format::{PixelFormat, Resolution};

/// Encoder configuration handed to a factory
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Encoded resolution (always even)
    pub resolution: Resolution,
    /// Pixel layout of the frames that will be submitted
    pub input_format: PixelFormat,
    /// Fully merged options (defaults + client overrides)
    pub options: EncodingOptions,
}

impl EncoderConfig {
    pub fn new(resolution: Resolution, input_format: PixelFormat, options: EncodingOptions) -> Self {
        Self {
            resolution,
            input_format,
            options,
        }
    }

    /// Typed view of the rate-control knobs
    pub fn settings(&self) -> EncoderSettings {
        EncoderSettings::from_options(&self.options)
    }
}

/// One compressed packet emitted by a backend
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Encoded data
    pub data: Bytes,
    /// Whether this packet starts a key frame
    pub key_frame: bool,
    /// Presentation timestamp (frame counter of the source frame)
    pub pts: i64,
    /// Resolution the packet was encoded at
    pub resolution: Resolution,
    /// Emission timestamp
    pub timestamp: Instant,
}

impl EncodedPacket {
    pub fn new(data: Bytes, key_frame: bool, pts: i64, resolution: Resolution) -> Self {
        Self {
            data,
            key_frame,
            pts,
            resolution,
            timestamp: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Whether a backend runs on the CPU or on dedicated hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Software,
    Hardware,
}

impl BackendKind {
    /// Guess the kind from a codec name ("h264_nvenc", "hevc_vaapi", "libx264", ...)
    pub fn from_codec_name(name: &str) -> Self {
        const HARDWARE_SUFFIXES: [&str; 6] = ["nvenc", "vaapi", "qsv", "amf", "rkmpp", "v4l2m2m"];
        if HARDWARE_SUFFIXES.iter().any(|s| name.contains(s)) {
            BackendKind::Hardware
        } else {
            BackendKind::Software
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, BackendKind::Hardware)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Software => write!(f, "Software"),
            BackendKind::Hardware => write!(f, "Hardware"),
        }
    }
}

/// Stateful codec session
///
/// Follows a send/receive model: `submit` feeds one frame, `receive_packet`
/// hands back zero or more packets one at a time until it returns `None`.
/// After `send_eos` the backend must flush everything it still buffers.
/// Not Sync: a session is driven from exactly one execution context.
pub trait EncoderBackend: Send {
    /// Concrete codec name
    fn name(&self) -> &str;

    /// Submit a converted frame
    fn submit(&mut self, frame: &[u8], pts: i64) -> Result<()>;

    /// Fetch the next ready packet, if any
    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>>;

    /// Signal end of stream so buffered packets get released
    fn send_eos(&mut self) -> Result<()>;

    /// Release backend resources
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Constructor for one concrete backend
pub trait EncoderFactory: Send + Sync {
    /// Concrete codec name used for lookup ("mjpeg", "libx264", ...)
    fn name(&self) -> &str;

    /// Codec family several backends may share ("h264", "mjpeg", ...)
    fn family(&self) -> &str;

    /// Software or hardware
    fn kind(&self) -> BackendKind;

    /// Priority within the family (lower is better)
    fn priority(&self) -> i32 {
        if self.kind().is_hardware() {
            10
        } else {
            100
        }
    }

    /// Pixel layout the backend consumes
    fn input_format(&self) -> PixelFormat;

    /// Check if this backend can run on this system
    fn is_available(&self) -> bool {
        true
    }

    /// Build a session for the given configuration
    fn configure(&self, config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_detection() {
        assert_eq!(BackendKind::from_codec_name("h264_nvenc"), BackendKind::Hardware);
        assert_eq!(BackendKind::from_codec_name("hevc_vaapi"), BackendKind::Hardware);
        assert_eq!(BackendKind::from_codec_name("libx264"), BackendKind::Software);
        assert_eq!(BackendKind::from_codec_name("mjpeg"), BackendKind::Software);
    }
}
