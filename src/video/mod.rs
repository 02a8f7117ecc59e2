//! Video conversion and encoding module
//!
//! This module provides pixel conversion, encoder backends and the stream
//! session that binds them to one captured format.

pub mod convert;
pub mod encoder;
pub mod format;
pub mod frame;
pub mod session;
pub mod worker;

pub use convert::{FrameConverter, PixelConverter};
pub use encoder::{EncodedPacket, EncoderRegistry, EncodingOptions};
pub use format::{round_up_even, PixelFormat, Resolution, StreamFormat};
pub use frame::VideoFrame;
pub use session::{DiscardSink, PacketSink, SessionStats, StreamSession, MAX_DRAIN_PACKETS};
pub use worker::{EncodeWorker, LatestFrame};
