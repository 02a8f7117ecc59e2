use serde::{Deserialize, Serialize};

use crate::video::EncodingOptions;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Streaming pipeline settings
    pub stream: StreamConfig,
    /// Bundled capture host settings
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Check values that serde cannot reject on its own
    pub fn validate(&self) -> Result<(), String> {
        if self.web.port == 0 {
            return Err("web.port must be non-zero".to_string());
        }
        if !self.web.ws_path.starts_with('/') {
            return Err(format!("web.ws_path must start with '/', got {:?}", self.web.ws_path));
        }
        if self.stream.codec.trim().is_empty() {
            return Err("stream.codec must not be empty".to_string());
        }
        if self.stream.tick_interval_ms == 0 {
            return Err("stream.tick_interval_ms must be non-zero".to_string());
        }
        if self.stream.send_queue_capacity == 0 {
            return Err("stream.send_queue_capacity must be non-zero".to_string());
        }
        if self.stream.default_options.contains_key(crate::video::encoder::CODEC_KEY) {
            return Err("stream.default_options must not carry 'codec'; use stream.codec".to_string());
        }

        let mut handles = std::collections::HashSet::new();
        for source in &self.capture.sources {
            if !handles.insert(source.handle) {
                return Err(format!("duplicate capture source handle {}", source.handle));
            }
            if source.width == 0 || source.height == 0 {
                return Err(format!("capture source {} has an empty size", source.handle));
            }
            if !matches!(source.depth, 3 | 4) {
                return Err(format!(
                    "capture source {} depth must be 3 or 4, got {}",
                    source.handle, source.depth
                ));
            }
        }
        if self.capture.sources.iter().filter(|s| s.primary).count() > 1 {
            return Err("at most one capture source may be primary".to_string());
        }
        Ok(())
    }
}

/// Web server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// HTTP port
    pub port: u16,
    /// WebSocket endpoint path
    pub ws_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8088,
            ws_path: "/ws".to_string(),
        }
    }
}

/// Where encoding runs for each connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    /// Encode inline on the server loop, once per tick
    #[default]
    Tick,
    /// Encode on a dedicated thread per connection
    Worker,
}

impl std::fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionModel::Tick => write!(f, "tick"),
            ExecutionModel::Worker => write!(f, "worker"),
        }
    }
}

/// Streaming pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Codec used when a client does not pick one
    pub codec: String,
    /// Server tick / encode period in milliseconds
    pub tick_interval_ms: u64,
    /// Execution model for encoding
    pub execution_model: ExecutionModel,
    /// Outbound messages buffered per client before packets are dropped
    pub send_queue_capacity: usize,
    /// Maximum concurrent clients (0 = unlimited)
    pub max_clients: usize,
    /// Options layered beneath every client's options
    pub default_options: EncodingOptions,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            codec: "mjpeg".to_string(),
            tick_interval_ms: 16,
            execution_model: ExecutionModel::Tick,
            send_queue_capacity: 256,
            max_clients: 16,
            default_options: EncodingOptions::new(),
        }
    }
}

impl StreamConfig {
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// One synthetic capture source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Handle clients use to select this source
    pub handle: u32,
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel (3 = RGB, 4 = RGBA)
    #[serde(default = "default_depth")]
    pub depth: u16,
    /// Fallback target for handle 1 and unknown handles
    #[serde(default)]
    pub primary: bool,
}

fn default_depth() -> u16 {
    4
}

impl SourceConfig {
    pub fn new(handle: u32, width: u32, height: u32, depth: u16) -> Self {
        Self {
            handle,
            width,
            height,
            depth,
            primary: false,
        }
    }
}

/// Capture host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sources exposed by the pattern host
    pub sources: Vec<SourceConfig>,
    /// Pattern animation rate
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sources: vec![SourceConfig {
                primary: true,
                ..SourceConfig::new(100, 1280, 720, 4)
            }],
            fps: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stream.codec, "mjpeg");
        assert_eq!(config.stream.execution_model, ExecutionModel::Tick);
        assert_eq!(config.capture.sources.len(), 1);
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [stream]
            execution_model = "worker"

            [stream.default_options]
            b = "1M"

            [[capture.sources]]
            handle = 5
            width = 640
            height = 480
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.execution_model, ExecutionModel::Worker);
        assert_eq!(config.stream.tick_interval_ms, 16);
        assert_eq!(config.stream.default_options.get("b"), Some("1M"));
        assert_eq!(config.capture.sources[0].depth, 4);
        assert_eq!(config.web.port, 8088);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.capture.sources.push(SourceConfig::new(100, 2, 2, 3));
        assert!(config.validate().unwrap_err().contains("duplicate"));

        let mut config = AppConfig::default();
        config.capture.sources[0].depth = 2;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.web.ws_path = "ws".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.stream.default_options.insert("codec", "mjpeg");
        assert!(config.validate().is_err());
    }
}
