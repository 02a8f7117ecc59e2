//! Synthetic test-pattern capture host
//!
//! Renders a moving colour gradient per source so the server can stream
//! without an attached renderer. Sources can be resized or removed at
//! runtime, which exercises the reconfiguration paths end to end.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{CaptureBinding, CaptureHost, SourceHandle, SourceInfo};
use crate::config::CaptureConfig;
use crate::video::{StreamFormat, VideoFrame};

struct PatternSource {
    format: StreamFormat,
    primary: bool,
    /// Number of active `enable_capture` calls
    enabled: u32,
    sequence: u64,
}

/// Capture host producing animated gradients
pub struct PatternHost {
    sources: RwLock<HashMap<SourceHandle, PatternSource>>,
    fps: u32,
    started: Instant,
}

impl PatternHost {
    pub fn from_config(config: &CaptureConfig) -> Self {
        let primary = config
            .sources
            .iter()
            .find(|s| s.primary)
            .or_else(|| config.sources.first())
            .map(|s| s.handle);

        let sources = config
            .sources
            .iter()
            .map(|s| {
                (
                    s.handle,
                    PatternSource {
                        format: StreamFormat::new(s.width, s.height, s.depth),
                        primary: Some(s.handle) == primary,
                        enabled: 0,
                        sequence: 0,
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        info!(
            "Pattern capture host with {} sources (primary: {:?})",
            sources.len(),
            primary
        );

        Self {
            sources: RwLock::new(sources),
            fps: config.fps.max(1),
            started: Instant::now(),
        }
    }

    /// Change a source's geometry
    ///
    /// Returns false, leaving the source untouched, if it does not exist or
    /// the new geometry is empty or not RGB24/RGBA.
    pub fn resize_source(&self, handle: SourceHandle, width: u32, height: u32, depth: u16) -> bool {
        let format = StreamFormat::new(width, height, depth);
        if !Self::is_renderable(format) {
            warn!("Rejected pattern source {} resize to {}", handle, format);
            return false;
        }
        match self.sources.write().get_mut(&handle) {
            Some(source) => {
                source.format = format;
                debug!("Pattern source {} resized to {}", handle, source.format);
                true
            }
            None => false,
        }
    }

    /// Remove a source, invalidating every binding to it
    pub fn remove_source(&self, handle: SourceHandle) -> bool {
        self.sources.write().remove(&handle).is_some()
    }

    /// Number of active captures on a source
    pub fn enabled_count(&self, handle: SourceHandle) -> u32 {
        self.sources.read().get(&handle).map(|s| s.enabled).unwrap_or(0)
    }

    fn is_renderable(format: StreamFormat) -> bool {
        !format.resolution().is_empty() && format.pixel_format().is_ok()
    }

    fn render(format: StreamFormat, phase: u32) -> Vec<u8> {
        let depth = format.pixel_depth as usize;
        let width = format.width as usize;
        let mut data = vec![0u8; format.frame_size()];
        for (y, row) in data.chunks_exact_mut(width * depth).enumerate() {
            for (x, pixel) in row.chunks_exact_mut(depth).enumerate() {
                pixel[0] = (x as u32).wrapping_add(phase) as u8;
                pixel[1] = (y as u32).wrapping_add(phase / 2) as u8;
                pixel[2] = phase as u8;
                if depth == 4 {
                    pixel[3] = 0xFF;
                }
            }
        }
        data
    }
}

impl CaptureHost for PatternHost {
    fn primary(&self) -> Option<SourceHandle> {
        self.sources
            .read()
            .iter()
            .find(|(_, s)| s.primary)
            .map(|(handle, _)| *handle)
    }

    fn contains(&self, handle: SourceHandle) -> bool {
        self.sources.read().contains_key(&handle)
    }

    fn is_valid(&self, binding: &CaptureBinding) -> bool {
        self.contains(binding.source)
    }

    fn enable_capture(&self, binding: &CaptureBinding) {
        if let Some(source) = self.sources.write().get_mut(&binding.source) {
            source.enabled += 1;
        }
    }

    fn disable_capture(&self, binding: &CaptureBinding) {
        if let Some(source) = self.sources.write().get_mut(&binding.source) {
            source.enabled = source.enabled.saturating_sub(1);
        }
    }

    fn capture(&self, binding: &CaptureBinding) -> Option<VideoFrame> {
        let (format, sequence) = {
            let mut sources = self.sources.write();
            let source = sources.get_mut(&binding.source)?;
            if source.enabled == 0 || !Self::is_renderable(source.format) {
                return None;
            }
            source.sequence += 1;
            (source.format, source.sequence)
        };

        let phase = (self.started.elapsed().as_millis() as u64 * self.fps as u64 / 1000) as u32;
        Some(VideoFrame::from_vec(Self::render(format, phase), format, sequence))
    }

    fn sources(&self) -> Vec<SourceInfo> {
        let mut sources: Vec<SourceInfo> = self
            .sources
            .read()
            .iter()
            .map(|(handle, s)| SourceInfo {
                handle: *handle,
                format: s.format,
                primary: s.primary,
            })
            .collect();
        sources.sort_by_key(|s| s.handle);
        sources
    }
}
