//! Encoder registry - lookup of encoder backends by name
//!
//! This module provides:
//! - Registration of backend factories (built-in and injected)
//! - Resolution of a requested codec name to a concrete factory
//! - Availability listing for the HTTP API
//!
//! The registry is an explicit value shared through `Arc`; there is no
//! process-wide instance.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::h264::OpenH264EncoderFactory;
use super::mjpeg::MjpegEncoderFactory;
use super::raw::RawVideoEncoderFactory;
use super::traits::{BackendKind, EncoderFactory};
use crate::error::{AppError, Result};
use crate::video::format::PixelFormat;

/// Information about a registered encoder
#[derive(Debug, Clone, Serialize)]
pub struct EncoderInfo {
    /// Codec name (e.g., "mjpeg", "h264_nvenc")
    pub name: String,
    /// Codec family shared by interchangeable backends
    pub family: String,
    /// Software or hardware
    pub kind: BackendKind,
    /// Priority (lower is better)
    pub priority: i32,
    /// Pixel layout the backend consumes
    pub input_format: PixelFormat,
    /// Whether the backend can run on this system
    pub available: bool,
}

impl EncoderInfo {
    fn from_factory(factory: &dyn EncoderFactory) -> Self {
        Self {
            name: factory.name().to_string(),
            family: factory.family().to_string(),
            kind: factory.kind(),
            priority: factory.priority(),
            input_format: factory.input_format(),
            available: factory.is_available(),
        }
    }
}

/// Encoder registry
///
/// Factories are kept ordered by family then priority, so the first
/// available match of a family is always the preferred backend.
#[derive(Default)]
pub struct EncoderRegistry {
    factories: Vec<Arc<dyn EncoderFactory>>,
}

impl EncoderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in software backends
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MjpegEncoderFactory));
        registry.register(Arc::new(OpenH264EncoderFactory));
        registry.register(Arc::new(RawVideoEncoderFactory));
        registry.log_summary();
        registry
    }

    /// Register a backend factory, replacing any factory with the same name
    pub fn register(&mut self, factory: Arc<dyn EncoderFactory>) {
        debug!(
            "Registered encoder: {} ({}) - {} priority={}",
            factory.name(),
            factory.family(),
            factory.kind(),
            factory.priority()
        );
        self.factories.retain(|f| f.name() != factory.name());
        self.factories.push(factory);
        self.factories.sort_by(|a, b| {
            a.family()
                .cmp(b.family())
                .then(a.priority().cmp(&b.priority()))
        });
    }

    /// Resolve a codec name to a factory
    ///
    /// An exact name match wins. Otherwise the name is treated as a family
    /// ("h264") and the best available backend of that family is returned.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn EncoderFactory>> {
        let name = name.trim();

        if let Some(factory) = self
            .factories
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
        {
            if factory.is_available() {
                return Ok(factory.clone());
            }
            debug!("Encoder {} is registered but unavailable", name);
        }

        self.factories
            .iter()
            .find(|f| f.family().eq_ignore_ascii_case(name) && f.is_available())
            .cloned()
            .ok_or_else(|| AppError::CodecNotFound(name.to_string()))
    }

    /// Check if a codec name resolves to an available backend
    pub fn is_available(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Describe every registered backend
    pub fn list(&self) -> Vec<EncoderInfo> {
        self.factories
            .iter()
            .map(|f| EncoderInfo::from_factory(f.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    fn log_summary(&self) {
        let hw_count = self
            .factories
            .iter()
            .filter(|f| f.kind().is_hardware())
            .count();
        info!(
            "Encoder registry: {} backends ({} hardware, {} software)",
            self.factories.len(),
            hw_count,
            self.factories.len() - hw_count
        );
    }
}

impl std::fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|factory| factory.name()))
            .finish()
    }
}
