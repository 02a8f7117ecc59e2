//! Test doubles shared by unit tests

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::{CaptureBinding, CaptureHost, SourceHandle, SourceInfo, FINAL_BUFFER};
use crate::error::{AppError, Result};
use crate::stream::transport::{Outbound, Transport};
use crate::video::encoder::{
    BackendKind, EncodedPacket, EncoderBackend, EncoderConfig, EncoderFactory, EncoderRegistry,
};
use crate::video::format::{PixelFormat, Resolution};
use crate::video::{StreamFormat, VideoFrame};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behaviour {
    /// One packet per submitted frame, after `delay` frames are buffered
    Normal { delay: usize },
    /// `configure` always fails
    Failing,
    /// `receive_packet` never runs dry
    Endless,
}

#[derive(Default)]
struct Record {
    configured: Vec<EncoderConfig>,
    submitted: Vec<i64>,
    eos: usize,
    closed: usize,
}

/// Factory whose backends log every call
#[derive(Clone)]
pub struct RecordingFactory {
    name: String,
    behaviour: Behaviour,
    record: Arc<Mutex<Record>>,
}

impl RecordingFactory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            behaviour: Behaviour::Normal { delay: 0 },
            record: Arc::new(Mutex::new(Record::default())),
        }
    }

    pub fn with_delay(mut self, delay: usize) -> Self {
        self.behaviour = Behaviour::Normal { delay };
        self
    }

    pub fn failing(mut self) -> Self {
        self.behaviour = Behaviour::Failing;
        self
    }

    pub fn endless(mut self) -> Self {
        self.behaviour = Behaviour::Endless;
        self
    }

    pub fn configured_resolutions(&self) -> Vec<Resolution> {
        self.record.lock().configured.iter().map(|c| c.resolution).collect()
    }

    pub fn configured_bitrates(&self) -> Vec<u64> {
        self.record
            .lock()
            .configured
            .iter()
            .map(|c| c.settings().bitrate)
            .collect()
    }

    /// Timestamps of every submitted frame, across sessions
    pub fn submitted(&self) -> Vec<i64> {
        self.record.lock().submitted.clone()
    }

    pub fn eos_count(&self) -> usize {
        self.record.lock().eos
    }

    pub fn close_count(&self) -> usize {
        self.record.lock().closed
    }
}

impl EncoderFactory for RecordingFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn input_format(&self) -> PixelFormat {
        PixelFormat::Yuv420
    }

    fn configure(&self, config: &EncoderConfig) -> Result<Box<dyn EncoderBackend>> {
        if self.behaviour == Behaviour::Failing {
            return Err(AppError::BackendInitFailed("scripted failure".to_string()));
        }
        self.record.lock().configured.push(config.clone());
        Ok(Box::new(RecordingBackend {
            name: self.name.clone(),
            behaviour: self.behaviour,
            resolution: config.resolution,
            pending: VecDeque::new(),
            eos: false,
            record: self.record.clone(),
        }))
    }
}

/// Backend emitting `"<w>x<h>#<pts>"` packets
pub struct RecordingBackend {
    name: String,
    behaviour: Behaviour,
    resolution: Resolution,
    pending: VecDeque<i64>,
    eos: bool,
    record: Arc<Mutex<Record>>,
}

impl RecordingBackend {
    fn packet(&self, pts: i64) -> EncodedPacket {
        let data = format!("{}x{}#{}", self.resolution.width, self.resolution.height, pts);
        EncodedPacket::new(Bytes::from(data), pts == 0, pts, self.resolution)
    }
}

impl EncoderBackend for RecordingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&mut self, _frame: &[u8], pts: i64) -> Result<()> {
        self.record.lock().submitted.push(pts);
        self.pending.push_back(pts);
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>> {
        match self.behaviour {
            Behaviour::Endless => Ok(Some(self.packet(-1))),
            Behaviour::Normal { delay } => {
                if self.eos || self.pending.len() > delay {
                    Ok(self.pending.pop_front().map(|pts| self.packet(pts)))
                } else {
                    Ok(None)
                }
            }
            Behaviour::Failing => Ok(None),
        }
    }

    fn send_eos(&mut self) -> Result<()> {
        self.eos = true;
        self.record.lock().eos += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record.lock().closed += 1;
        Ok(())
    }
}

/// Built-in backends plus `factory`
pub fn registry_with(factory: &RecordingFactory) -> Arc<EncoderRegistry> {
    let mut registry = EncoderRegistry::with_builtin();
    registry.register(Arc::new(factory.clone()));
    Arc::new(registry)
}

pub fn rgba_frame(width: u32, height: u32, sequence: u64) -> VideoFrame {
    let format = StreamFormat::new(width, height, 4);
    VideoFrame::from_vec(vec![0x40; format.frame_size()], format, sequence)
}

struct ScriptedSource {
    format: StreamFormat,
    primary: bool,
    sequence: u64,
    corrupt_next: bool,
}

/// Capture host whose sources tests can resize and remove
#[derive(Default)]
pub struct ScriptedHost {
    sources: Mutex<HashMap<SourceHandle, ScriptedSource>>,
    /// Net enable count per source, kept across removal
    enabled: Mutex<HashMap<SourceHandle, i64>>,
    disables: Mutex<HashMap<SourceHandle, usize>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&self, handle: SourceHandle, format: StreamFormat, primary: bool) {
        self.sources.lock().insert(
            handle,
            ScriptedSource {
                format,
                primary,
                sequence: 0,
                corrupt_next: false,
            },
        );
    }

    pub fn set_format(&self, handle: SourceHandle, format: StreamFormat) {
        if let Some(source) = self.sources.lock().get_mut(&handle) {
            source.format = format;
        }
    }

    pub fn remove_source(&self, handle: SourceHandle) {
        self.sources.lock().remove(&handle);
    }

    /// Make the next captured frame one byte short
    pub fn corrupt_next_frame(&self, handle: SourceHandle) {
        if let Some(source) = self.sources.lock().get_mut(&handle) {
            source.corrupt_next = true;
        }
    }

    pub fn enabled_count(&self, handle: SourceHandle) -> i64 {
        self.enabled.lock().get(&handle).copied().unwrap_or(0)
    }

    pub fn disable_calls(&self, handle: SourceHandle) -> usize {
        self.disables.lock().get(&handle).copied().unwrap_or(0)
    }
}

impl CaptureHost for ScriptedHost {
    fn primary(&self) -> Option<SourceHandle> {
        self.sources
            .lock()
            .iter()
            .find(|(_, s)| s.primary)
            .map(|(handle, _)| *handle)
    }

    fn contains(&self, handle: SourceHandle) -> bool {
        self.sources.lock().contains_key(&handle)
    }

    fn is_valid(&self, binding: &CaptureBinding) -> bool {
        binding.buffer == FINAL_BUFFER && self.contains(binding.source)
    }

    fn enable_capture(&self, binding: &CaptureBinding) {
        *self.enabled.lock().entry(binding.source).or_default() += 1;
    }

    fn disable_capture(&self, binding: &CaptureBinding) {
        *self.enabled.lock().entry(binding.source).or_default() -= 1;
        *self.disables.lock().entry(binding.source).or_default() += 1;
    }

    fn capture(&self, binding: &CaptureBinding) -> Option<VideoFrame> {
        if self.enabled_count(binding.source) <= 0 {
            return None;
        }
        let mut sources = self.sources.lock();
        let source = sources.get_mut(&binding.source)?;
        let mut len = source.format.frame_size();
        if std::mem::take(&mut source.corrupt_next) {
            len -= 1;
        }
        let frame = VideoFrame::from_vec(vec![0x80; len], source.format, source.sequence);
        source.sequence += 1;
        Some(frame)
    }

    fn sources(&self) -> Vec<SourceInfo> {
        self.sources
            .lock()
            .iter()
            .map(|(handle, s)| SourceInfo {
                handle: *handle,
                format: s.format,
                primary: s.primary,
            })
            .collect()
    }
}

/// Transport that records everything sent through it
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later send fail as if the peer vanished
    pub fn fail_writes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                Outbound::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn binaries(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                Outbound::Binary(data) => Some(data.to_vec()),
                _ => None,
            })
            .collect()
    }

    pub fn binary_count(&self) -> usize {
        self.binaries().len()
    }

    fn push(&self, message: Outbound) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) || self.is_closed() {
            return Err(AppError::TransportWriteFailed("recording transport closed".to_string()));
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn send_text(&self, text: String) -> Result<()> {
        self.push(Outbound::Text(text))
    }

    fn send_binary(&self, data: Bytes) -> Result<()> {
        self.push(Outbound::Binary(data))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.sent.lock().push(Outbound::Close);
        }
    }
}
