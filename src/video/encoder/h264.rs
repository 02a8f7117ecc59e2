//! H.264 software encoder using OpenH264
//!
//! Consumes YUV420P frames. Rate control runs in bitrate mode with the
//! screen-content real-time profile; the configured `b`, `time_base` and
//! `g` options become the target bitrate, frame rate and key frame interval.

use bytes::Bytes;
use std::collections::VecDeque;
use tracing::debug;

use openh264::encoder::{
    BitRate, Encoder, EncoderConfig as OpenH264Config, FrameRate, FrameType, RateControlMode,
    UsageType,
};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use super::options::EncoderSettings;
use super::traits::{BackendKind, EncodedPacket, EncoderBackend, EncoderConfig, EncoderFactory};
use crate::error::{AppError, Result};
use crate::video::format::{PixelFormat, Resolution};

/// Factory for the OpenH264 software backend (family `h264`)
pub struct OpenH264EncoderFactory;

impl EncoderFactory for OpenH264EncoderFactory {
    fn name(&self) -> &str {
        "openh264"
    }

    fn family(&self) -> &str {
        "h264"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn input_format(&self) -> PixelFormat {
        PixelFormat::Yuv420
    }

    fn configure(&self, config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>> {
        Ok(Box::new(OpenH264Encoder::new(config)?))
    }
}

/// OpenH264 encoder session
pub struct OpenH264Encoder {
    inner: Encoder,
    resolution: Resolution,
    settings: EncoderSettings,
    frame_size: usize,
    /// Frames since the last forced key frame
    since_key: u32,
    pending: VecDeque<EncodedPacket>,
    eos: bool,
}

impl OpenH264Encoder {
    pub fn new(config: &EncoderConfig) -> Result<Self> {
        if config.input_format != PixelFormat::Yuv420 {
            return Err(AppError::BackendInitFailed(format!(
                "openh264 expects YUV420P input, got {}",
                config.input_format
            )));
        }

        let resolution = config.resolution;
        if resolution.width == 0
            || resolution.height == 0
            || resolution.width % 2 != 0
            || resolution.height % 2 != 0
        {
            return Err(AppError::BackendInitFailed(format!(
                "openh264 cannot encode {}",
                resolution
            )));
        }

        let settings = config.settings();
        let bitrate = u32::try_from(settings.bitrate).unwrap_or(u32::MAX);
        let fps = settings.fps.max(1);

        let encoder_config = OpenH264Config::new()
            .bitrate(BitRate::from_bps(bitrate))
            .max_frame_rate(FrameRate::from_hz(fps as f32))
            .usage_type(UsageType::ScreenContentRealTime)
            .rate_control_mode(RateControlMode::Bitrate);

        let inner = Encoder::with_api_config(OpenH264API::from_source(), encoder_config)
            .map_err(|e| AppError::BackendInitFailed(format!("openh264: {}", e)))?;

        debug!(
            "OpenH264 encoder configured: {} bitrate={}bps fps={} gop={}",
            resolution, bitrate, fps, settings.gop_size
        );

        Ok(Self {
            inner,
            resolution,
            frame_size: PixelFormat::Yuv420.frame_size(resolution),
            settings,
            since_key: 0,
            pending: VecDeque::new(),
            eos: false,
        })
    }

    /// Effective rate-control settings
    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Target bitrate in bits/s
    pub fn bitrate(&self) -> u64 {
        self.settings.bitrate
    }
}

impl EncoderBackend for OpenH264Encoder {
    fn name(&self) -> &str {
        "openh264"
    }

    fn submit(&mut self, frame: &[u8], pts: i64) -> Result<()> {
        if self.eos {
            return Err(AppError::EncodeFailed("openh264: frame after end of stream".into()));
        }
        if frame.len() != self.frame_size {
            return Err(AppError::EncodeFailed(format!(
                "openh264: expected {} bytes, got {}",
                self.frame_size,
                frame.len()
            )));
        }

        // g=0 leaves key frame placement to the encoder
        let gop = self.settings.gop_size;
        if gop > 0 && self.since_key >= gop {
            self.inner.force_intra_frame();
            self.since_key = 0;
        }

        let yuv = YUVBuffer::from_vec(
            frame.to_vec(),
            self.resolution.width as usize,
            self.resolution.height as usize,
        );
        let bitstream = self
            .inner
            .encode(&yuv)
            .map_err(|e| AppError::EncodeFailed(format!("openh264: {}", e)))?;

        let key_frame = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();
        self.since_key = if key_frame { 1 } else { self.since_key + 1 };

        // Rate control may skip a frame entirely
        if !data.is_empty() {
            self.pending.push_back(EncodedPacket::new(
                Bytes::from(data),
                key_frame,
                pts,
                self.resolution,
            ));
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>> {
        Ok(self.pending.pop_front())
    }

    fn send_eos(&mut self) -> Result<()> {
        // No frame reordering (bf=0), so nothing is held back
        self.eos = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::encoder::options::{resolve_options, EncodingOptions};

    fn config(width: u32, height: u32, client: EncodingOptions) -> EncoderConfig {
        let options = resolve_options(BackendKind::Software, &EncodingOptions::new(), &client);
        EncoderConfig::new(Resolution::new(width, height), PixelFormat::Yuv420, options)
    }

    fn gray(width: u32, height: u32) -> Vec<u8> {
        vec![0x80; (width * height * 3 / 2) as usize]
    }

    #[test]
    fn test_bitrate_follows_options() {
        let client: EncodingOptions = [("bit_rate", "800000"), ("g", "30")].into_iter().collect();
        let encoder = OpenH264Encoder::new(&config(32, 32, client)).unwrap();
        assert_eq!(encoder.bitrate(), 800_000);
        assert_eq!(encoder.settings().gop_size, 30);
        assert_eq!(encoder.settings().fps, 60);
    }

    #[test]
    fn test_first_packet_is_key_frame() {
        let mut encoder = OpenH264Encoder::new(&config(32, 32, EncodingOptions::new())).unwrap();
        encoder.submit(&gray(32, 32), 0).unwrap();

        let packet = encoder.receive_packet().unwrap().unwrap();
        assert!(packet.key_frame);
        assert_eq!(packet.pts, 0);
        assert_eq!(packet.resolution, Resolution::new(32, 32));
        // Annex B start code
        assert!(packet.data.starts_with(&[0, 0, 1]) || packet.data.starts_with(&[0, 0, 0, 1]));
    }

    #[test]
    fn test_rejects_bad_input() {
        let rgb = EncoderConfig::new(
            Resolution::new(32, 32),
            PixelFormat::Rgb24,
            EncodingOptions::new(),
        );
        assert!(matches!(
            OpenH264Encoder::new(&rgb),
            Err(AppError::BackendInitFailed(_))
        ));
        assert!(OpenH264Encoder::new(&config(31, 32, EncodingOptions::new())).is_err());

        let mut encoder = OpenH264Encoder::new(&config(32, 32, EncodingOptions::new())).unwrap();
        let err = encoder.submit(&[0; 10], 0).unwrap_err();
        assert!(matches!(err, AppError::EncodeFailed(_)));
    }
}
