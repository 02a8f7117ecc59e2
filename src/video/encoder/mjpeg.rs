//! Motion-JPEG backend
//!
//! Every frame is compressed independently with `jpeg-encoder`, so each
//! packet is a key frame and nothing is held back across `submit` calls.

use bytes::Bytes;
use jpeg_encoder::{ColorType, Encoder};
use std::collections::VecDeque;
use tracing::debug;

use super::traits::{BackendKind, EncodedPacket, EncoderBackend, EncoderConfig, EncoderFactory};
use crate::error::{AppError, Result};
use crate::video::format::{PixelFormat, Resolution};

/// Factory for the built-in MJPEG backend
pub struct MjpegEncoderFactory;

impl EncoderFactory for MjpegEncoderFactory {
    fn name(&self) -> &str {
        "mjpeg"
    }

    fn family(&self) -> &str {
        "mjpeg"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgb24
    }

    fn configure(&self, config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>> {
        Ok(Box::new(MjpegEncoder::new(config)?))
    }
}

/// JPEG-per-frame encoder session
pub struct MjpegEncoder {
    resolution: Resolution,
    width: u16,
    height: u16,
    quality: u8,
    pending: VecDeque<EncodedPacket>,
    eos: bool,
}

impl MjpegEncoder {
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        if config.input_format != PixelFormat::Rgb24 {
            return Err(AppError::BackendInitFailed(format!(
                "mjpeg expects RGB24 input, got {}",
                config.input_format
            )));
        }

        let resolution = config.resolution;
        let (width, height) = match (
            u16::try_from(resolution.width),
            u16::try_from(resolution.height),
        ) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(AppError::BackendInitFailed(format!(
                    "mjpeg cannot encode {}",
                    resolution
                )))
            }
        };

        let quality = config.settings().quality;
        debug!("MJPEG encoder configured: {} quality={}", resolution, quality);

        Ok(Self {
            resolution,
            width,
            height,
            quality,
            pending: VecDeque::new(),
            eos: false,
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl EncoderBackend for MjpegEncoder {
    fn name(&self) -> &str {
        "mjpeg"
    }

    fn submit(&mut self, frame: &[u8], pts: i64) -> Result<()> {
        if self.eos {
            return Err(AppError::EncodeFailed("mjpeg: frame after end of stream".into()));
        }

        let mut buf = Vec::with_capacity(frame.len() / 8);
        Encoder::new(&mut buf, self.quality)
            .encode(frame, self.width, self.height, ColorType::Rgb)
            .map_err(|e| AppError::EncodeFailed(format!("JPEG compression failed: {}", e)))?;

        self.pending.push_back(EncodedPacket::new(
            Bytes::from(buf),
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
        self.eos = true;
        Ok(())
    }
}
