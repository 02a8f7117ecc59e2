//! Video encoder implementations
//!
//! This module provides video encoding capabilities including:
//! - A send/receive backend abstraction with pluggable factories
//! - MJPEG encoding for converted RGB frames
//! - H.264 software encoding via OpenH264
//! - Raw YUV420 passthrough
//! - Encoder registry for name and family lookup
//! - Option layering (rate-control defaults + client overrides)

pub mod h264;
pub mod mjpeg;
pub mod options;
pub mod raw;
pub mod registry;
pub mod traits;

// Core traits and types
pub use traits::{BackendKind, EncodedPacket, EncoderBackend, EncoderConfig, EncoderFactory};

// Options
pub use options::{resolve_options, EncoderSettings, EncodingOptions, CODEC_KEY};

// Encoder registry
pub use registry::{EncoderInfo, EncoderRegistry};

// Built-in backends
pub use h264::{OpenH264Encoder, OpenH264EncoderFactory};
pub use mjpeg::{MjpegEncoder, MjpegEncoderFactory};
pub use raw::{RawVideoEncoder, RawVideoEncoderFactory};
