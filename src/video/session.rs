//! Stream session - one converter + encoder pair bound to a stream format
//!
//! A session is created closed. `open` resolves the backend, builds the
//! converter for the captured geometry and resets the frame counter.
//! `push_frame` converts, submits and drains. `close` flushes the backend
//! before releasing it and never fails.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::convert::{FrameConverter, PixelConverter};
use super::encoder::{
    resolve_options, EncodedPacket, EncoderBackend, EncoderConfig, EncoderRegistry,
    EncodingOptions,
};
use super::format::{Resolution, StreamFormat};
use crate::error::{AppError, Result};

/// Upper bound on packets pulled from a backend in one drain pass
///
/// Keeps `close` finite when a backend keeps reporting output after EOS.
pub const MAX_DRAIN_PACKETS: usize = 64;

/// Destination for encoded packets
pub trait PacketSink {
    fn send_packet(&mut self, packet: EncodedPacket) -> Result<()>;
}

impl<F> PacketSink for F
where
    F: FnMut(EncodedPacket) -> Result<()>,
{
    fn send_packet(&mut self, packet: EncodedPacket) -> Result<()> {
        self(packet)
    }
}

/// Sink that drops every packet (used when flushing a session nobody reads)
pub struct DiscardSink;

impl PacketSink for DiscardSink {
    fn send_packet(&mut self, _packet: EncodedPacket) -> Result<()> {
        Ok(())
    }
}

/// Session counters
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SessionStats {
    /// Successful `open` calls
    pub opens: u64,
    /// Frames submitted to a backend
    pub frames_encoded: u64,
    /// Frames rejected by conversion or encoding
    pub frames_dropped: u64,
    pub packets_emitted: u64,
    pub bytes_emitted: u64,
}

/// Everything that only exists while the session is open
struct OpenState {
    backend: Box<dyn EncoderBackend>,
    converter: PixelConverter,
    format: StreamFormat,
    encoded_resolution: Resolution,
    codec: String,
    frame_counter: i64,
}

/// Converter + encoder bound to one `(format, codec, options)` tuple
pub struct StreamSession {
    registry: Arc<EncoderRegistry>,
    /// Server-configured option defaults, layered beneath client options
    configured_options: EncodingOptions,
    state: Option<OpenState>,
    stats: SessionStats,
}

impl StreamSession {
    pub fn new(registry: Arc<EncoderRegistry>, configured_options: EncodingOptions) -> Self {
        Self {
            registry,
            configured_options,
            state: None,
            stats: SessionStats::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Source format of the open session
    pub fn format(&self) -> Option<StreamFormat> {
        self.state.as_ref().map(|s| s.format)
    }

    /// Even resolution the backend encodes at
    pub fn encoded_resolution(&self) -> Option<Resolution> {
        self.state.as_ref().map(|s| s.encoded_resolution)
    }

    /// Concrete backend name of the open session
    pub fn codec(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.codec.as_str())
    }

    /// Timestamp the next submitted frame will carry
    pub fn frame_counter(&self) -> i64 {
        self.state.as_ref().map(|s| s.frame_counter).unwrap_or(0)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Open the session for frames of `format`
    ///
    /// An already open session is flushed into a discard sink first. On
    /// error the session stays closed.
    pub fn open(&mut self, format: StreamFormat, codec: &str, options: &EncodingOptions) -> Result<()> {
        if self.is_open() {
            self.close(&mut DiscardSink);
        }

        let source_format = format
            .pixel_format()
            .map_err(|e| AppError::BackendInitFailed(e.to_string()))?;
        let factory = self.registry.resolve(codec)?;
        let encoded_resolution = format.encoded_resolution();

        let converter = PixelConverter::new(
            format.resolution(),
            source_format,
            encoded_resolution,
            factory.input_format(),
        )?;

        let options = resolve_options(factory.kind(), &self.configured_options, options);
        let config = EncoderConfig::new(encoded_resolution, factory.input_format(), options);
        let backend = factory.configure(&config).map_err(|e| match e {
            AppError::BackendInitFailed(_) => e,
            other => AppError::BackendInitFailed(format!("{}: {}", factory.name(), other)),
        })?;

        info!(
            codec = factory.name(),
            source = %format,
            encoded = %encoded_resolution,
            "Stream session opened"
        );

        self.state = Some(OpenState {
            backend,
            converter,
            format,
            encoded_resolution,
            codec: factory.name().to_string(),
            frame_counter: 0,
        });
        self.stats.opens += 1;
        Ok(())
    }

    /// Convert, encode and drain one frame
    ///
    /// Returns the number of packets forwarded to `sink`. A closed session
    /// accepts and ignores frames. Conversion and encode errors drop only
    /// this frame; sink errors are returned as-is.
    pub fn push_frame(
        &mut self,
        raw: &[u8],
        format: StreamFormat,
        sink: &mut dyn PacketSink,
    ) -> Result<usize> {
        let Some(state) = self.state.as_mut() else {
            return Ok(0);
        };

        if format != state.format {
            self.stats.frames_dropped += 1;
            return Err(AppError::ConversionFailed(format!(
                "frame is {}, session expects {}",
                format, state.format
            )));
        }

        let converted = match state.converter.convert(raw) {
            Ok(converted) => converted,
            Err(e) => {
                self.stats.frames_dropped += 1;
                return Err(e);
            }
        };

        let pts = state.frame_counter;
        if let Err(e) = state.backend.submit(converted, pts) {
            self.stats.frames_dropped += 1;
            return Err(match e {
                AppError::EncodeFailed(_) => e,
                other => AppError::EncodeFailed(other.to_string()),
            });
        }
        state.frame_counter += 1;
        self.stats.frames_encoded += 1;

        let drained = drain(state.backend.as_mut(), sink, &mut self.stats)?;
        if drained.capped {
            debug!(
                codec = %state.codec,
                "Backend still has output after {} packets, continuing next frame",
                MAX_DRAIN_PACKETS
            );
        }
        Ok(drained.packets)
    }

    /// Flush and release the backend
    ///
    /// Remaining packets go to `sink`; a failing sink stops forwarding but
    /// the backend is still drained and released. Idempotent.
    pub fn close(&mut self, sink: &mut dyn PacketSink) {
        let Some(mut state) = self.state.take() else {
            return;
        };

        if let Err(e) = state.backend.send_eos() {
            warn!(codec = %state.codec, "Failed to signal end of stream: {}", e);
        }

        let mut forwarding = true;
        let mut flushed = 0usize;
        let mut capped = true;
        for _ in 0..MAX_DRAIN_PACKETS {
            match state.backend.receive_packet() {
                Ok(Some(packet)) => {
                    flushed += 1;
                    if forwarding {
                        let len = packet.len() as u64;
                        match sink.send_packet(packet) {
                            Ok(()) => {
                                self.stats.packets_emitted += 1;
                                self.stats.bytes_emitted += len;
                            }
                            Err(e) => {
                                debug!("Dropping flushed packets: {}", e);
                                forwarding = false;
                            }
                        }
                    }
                }
                Ok(None) => {
                    capped = false;
                    break;
                }
                Err(e) => {
                    warn!(codec = %state.codec, "Flush failed: {}", e);
                    capped = false;
                    break;
                }
            }
        }

        if capped {
            warn!(
                codec = %state.codec,
                "Backend still reports output after {} flushed packets, abandoning flush",
                MAX_DRAIN_PACKETS
            );
        }

        if let Err(e) = state.backend.close() {
            warn!(codec = %state.codec, "Failed to release encoder backend: {}", e);
        }

        info!(
            codec = %state.codec,
            frames = state.frame_counter,
            flushed,
            "Stream session closed"
        );
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close(&mut DiscardSink);
    }
}

struct DrainOutcome {
    packets: usize,
    capped: bool,
}

fn drain(
    backend: &mut dyn EncoderBackend,
    sink: &mut dyn PacketSink,
    stats: &mut SessionStats,
) -> Result<DrainOutcome> {
    let mut packets = 0;
    while packets < MAX_DRAIN_PACKETS {
        let packet = match backend.receive_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(DrainOutcome { packets, capped: false }),
            Err(e) => return Err(AppError::EncodeFailed(e.to_string())),
        };
        let len = packet.len() as u64;
        sink.send_packet(packet)?;
        packets += 1;
        stats.packets_emitted += 1;
        stats.bytes_emitted += len;
    }
    Ok(DrainOutcome { packets, capped: true })
}
