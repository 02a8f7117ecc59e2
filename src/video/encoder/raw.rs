//! Raw YUV420 passthrough backend
//!
//! Emits the converted planar frame unchanged. Useful for clients that do
//! their own compression and for exercising the pipeline without a codec.

use bytes::Bytes;
use std::collections::VecDeque;

use super::traits::{BackendKind, EncodedPacket, EncoderBackend, EncoderConfig, EncoderFactory};
use crate::error::{AppError, Result};
use crate::video::format::{PixelFormat, Resolution};

pub struct RawVideoEncoderFactory;

impl EncoderFactory for RawVideoEncoderFactory {
    fn name(&self) -> &str {
        "rawvideo"
    }

    fn family(&self) -> &str {
        "rawvideo"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn input_format(&self) -> PixelFormat {
        PixelFormat::Yuv420
    }

    fn configure(&self, config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>> {
        if config.input_format != PixelFormat::Yuv420 {
            return Err(AppError::BackendInitFailed(format!(
                "rawvideo expects YUV420 input, got {}",
                config.input_format
            )));
        }
        Ok(Box::new(RawVideoEncoder {
            resolution: config.resolution,
            frame_size: PixelFormat::Yuv420.frame_size(config.resolution),
            pending: VecDeque::new(),
        }))
    }
}

pub struct RawVideoEncoder {
    resolution: Resolution,
    frame_size: usize,
    pending: VecDeque<EncodedPacket>,
}

impl EncoderBackend for RawVideoEncoder {
    fn name(&self) -> &str {
        "rawvideo"
    }

    fn submit(&mut self, frame: &[u8], pts: i64) -> Result<()> {
        if frame.len() != self.frame_size {
            return Err(AppError::EncodeFailed(format!(
                "rawvideo frame is {} bytes, expected {}",
                frame.len(),
                self.frame_size
            )));
        }
        self.pending.push_back(EncodedPacket::new(
            Bytes::copy_from_slice(frame),
            true,
            pts,
            self.resolution,
        ));
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>> {
        Ok(self.pending.pop_front())
    }

    fn send_eos(&mut self) -> Result<()> {
        Ok(())
    }
}
