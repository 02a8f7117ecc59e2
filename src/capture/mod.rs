//! Capture sources
//!
//! A `CaptureHost` is whatever renders or decodes frames (a window system,
//! a game engine, a test pattern). Connections bind to one of its sources
//! and pull at most one frame per tick.

pub mod pattern;

pub use pattern::PatternHost;

use serde::Serialize;
use std::fmt;

use crate::error::{AppError, Result};
use crate::video::{StreamFormat, VideoFrame};

/// Identifier of a capture source within a host
pub type SourceHandle = u32;

/// Handle value clients send when they have no specific target
pub const DEFAULT_HANDLE: i64 = 1;

/// Buffer name for the fully composited output of a source
pub const FINAL_BUFFER: &str = "final";

/// Which source (and buffer within it) a connection pulls frames from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CaptureBinding {
    pub source: SourceHandle,
    pub buffer: String,
}

impl CaptureBinding {
    pub fn new(source: SourceHandle) -> Self {
        Self {
            source,
            buffer: FINAL_BUFFER.to_string(),
        }
    }
}

impl fmt::Display for CaptureBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.buffer)
    }
}

/// Description of a source for listings
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub handle: SourceHandle,
    pub format: StreamFormat,
    pub primary: bool,
}

/// Frame producer shared by all connections
///
/// Calls come from the connection's execution context; implementations
/// must tolerate any number of bindings to the same source.
pub trait CaptureHost: Send + Sync {
    /// Source used when a client names no valid target
    fn primary(&self) -> Option<SourceHandle>;

    /// Whether `handle` names an existing source
    fn contains(&self, handle: SourceHandle) -> bool;

    /// Whether frames can currently be captured through `binding`
    fn is_valid(&self, binding: &CaptureBinding) -> bool;

    /// Start producing frames for `binding`
    fn enable_capture(&self, binding: &CaptureBinding);

    /// Stop producing frames for `binding`; pairs with one `enable_capture`
    fn disable_capture(&self, binding: &CaptureBinding);

    /// Grab the current frame, if one is available
    fn capture(&self, binding: &CaptureBinding) -> Option<VideoFrame>;

    /// List sources
    fn sources(&self) -> Vec<SourceInfo> {
        Vec::new()
    }
}

/// Map a client-supplied handle to a binding
///
/// `1`, negative, and unknown handles fall back to the primary source. A
/// missing handle, or no primary source to fall back to, is an
/// `InvalidCaptureBinding` error.
pub fn resolve_binding(host: &dyn CaptureHost, handle: Option<i64>) -> Result<CaptureBinding> {
    let handle = handle.ok_or_else(|| {
        AppError::InvalidCaptureBinding("open request carries no handle".to_string())
    })?;

    let requested = SourceHandle::try_from(handle)
        .ok()
        .filter(|h| i64::from(*h) != DEFAULT_HANDLE && host.contains(*h));

    match requested.or_else(|| host.primary()) {
        Some(source) => Ok(CaptureBinding::new(source)),
        None => Err(AppError::InvalidCaptureBinding(format!(
            "no capture source for handle {}",
            handle
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, SourceConfig};

    fn host() -> PatternHost {
        PatternHost::from_config(&CaptureConfig {
            sources: vec![
                SourceConfig::new(100, 64, 48, 4),
                SourceConfig::new(7, 32, 32, 3),
            ],
            ..Default::default()
        })
    }

    #[test]
    fn test_default_handle_binds_primary() {
        let host = host();
        let binding = resolve_binding(&host, Some(DEFAULT_HANDLE)).unwrap();
        assert_eq!(binding, CaptureBinding::new(100));
        assert_eq!(binding.buffer, FINAL_BUFFER);
    }

    #[test]
    fn test_explicit_and_unknown_handles() {
        let host = host();
        assert_eq!(resolve_binding(&host, Some(7)).unwrap().source, 7);
        assert_eq!(resolve_binding(&host, Some(4242)).unwrap().source, 100);
        assert_eq!(resolve_binding(&host, Some(-3)).unwrap().source, 100);
    }

    #[test]
    fn test_missing_handle_or_primary() {
        let host = host();
        assert!(matches!(
            resolve_binding(&host, None),
            Err(AppError::InvalidCaptureBinding(_))
        ));

        let empty = PatternHost::from_config(&CaptureConfig {
            sources: Vec::new(),
            ..Default::default()
        });
        assert!(matches!(
            resolve_binding(&empty, Some(1)),
            Err(AppError::InvalidCaptureBinding(_))
        ));
    }
}
