//! Control-channel messages
//!
//! Clients drive their stream with small JSON text messages:
//!
//! ```json
//! {"handle": 1, "id": 7, "options": {"codec": "mjpeg", "q": "70"}}
//! {"message": "resize"}
//! {"message": "options", "options": {"bit_rate": "800000"}}
//! ```
//!
//! The server answers with `resize_done` after a reconfiguration and with
//! prefixed human-readable notices (`info: ...`, `warning: ...`,
//! `error: ...`).

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{AppError, Result};
use crate::video::EncodingOptions;

/// Parsed client request
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Bind to a capture source and start streaming
    Open {
        handle: Option<i64>,
        id: Option<i64>,
        options: Option<EncodingOptions>,
    },
    /// Reopen the stream against the current binding
    Resize,
    /// Replace the encoding options, then reopen
    Options { options: EncodingOptions },
}

#[derive(Debug, Deserialize)]
struct RawControlMessage {
    message: Option<String>,
    handle: Option<i64>,
    id: Option<i64>,
    options: Option<BTreeMap<String, Value>>,
}

impl ControlCommand {
    /// Parse a text control message
    pub fn parse(payload: &str) -> Result<Self> {
        let raw: RawControlMessage = serde_json::from_str(payload)
            .map_err(|e| AppError::MalformedControlMessage(e.to_string()))?;
        let options = raw.options.map(options_from_json).transpose()?;

        match raw.message.as_deref() {
            Some("resize") => Ok(ControlCommand::Resize),
            Some("options") => {
                let options = options.ok_or_else(|| {
                    AppError::MalformedControlMessage("options message without options".to_string())
                })?;
                Ok(ControlCommand::Options { options })
            }
            Some(other) => Err(AppError::MalformedControlMessage(format!(
                "unknown message kind {:?}",
                other
            ))),
            // A bare options object (no handle) reconfigures the current stream
            None if raw.handle.is_none() && options.is_some() => Ok(ControlCommand::Options {
                options: options.unwrap_or_default(),
            }),
            None => Ok(ControlCommand::Open {
                handle: raw.handle,
                id: raw.id,
                options,
            }),
        }
    }
}

/// Flatten JSON option values to strings
///
/// Numbers and booleans are accepted for convenience; nested values are not.
fn options_from_json(map: BTreeMap<String, Value>) -> Result<EncodingOptions> {
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(AppError::MalformedControlMessage(format!(
                        "option {:?} must be a string, got {}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// Server-to-client text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ResizeDone,
    Info(String),
    Warning(String),
    Error(String),
}

impl Notice {
    pub fn to_text(&self) -> String {
        match self {
            Notice::ResizeDone => "resize_done".to_string(),
            Notice::Info(msg) => format!("info: {}", msg),
            Notice::Warning(msg) => format!("warning: {}", msg),
            Notice::Error(msg) => format!("error: {}", msg),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_message() {
        let cmd = ControlCommand::parse(r#"{"handle": 1, "id": 3, "options": {"q": 70, "codec": "mjpeg"}}"#)
            .unwrap();
        let ControlCommand::Open { handle, id, options } = cmd else {
            panic!("expected open, got {:?}", cmd);
        };
        assert_eq!(handle, Some(1));
        assert_eq!(id, Some(3));
        let options = options.unwrap();
        assert_eq!(options.get("q"), Some("70"));
        assert_eq!(options.get("codec"), Some("mjpeg"));
    }

    #[test]
    fn test_resize_and_options() {
        assert_eq!(
            ControlCommand::parse(r#"{"message": "resize"}"#).unwrap(),
            ControlCommand::Resize
        );

        let cmd = ControlCommand::parse(r#"{"message": "options", "options": {"bit_rate": "800000"}}"#)
            .unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Options {
                options: [("bit_rate", "800000")].into_iter().collect()
            }
        );
    }

    #[test]
    fn test_bare_options_reconfigure() {
        let cmd = ControlCommand::parse(r#"{"options": {"bit_rate": "800000"}}"#).unwrap();
        assert!(matches!(cmd, ControlCommand::Options { .. }));

        // With a handle the same payload is an open request
        let cmd = ControlCommand::parse(r#"{"handle": 5, "options": {}}"#).unwrap();
        assert!(matches!(cmd, ControlCommand::Open { handle: Some(5), .. }));
    }

    #[test]
    fn test_malformed_messages() {
        for payload in [
            "not json",
            "[1, 2]",
            r#"{"message": "explode"}"#,
            r#"{"message": "options"}"#,
            r#"{"handle": "one"}"#,
            r#"{"handle": 1, "options": {"b": {"nested": true}}}"#,
        ] {
            let err = ControlCommand::parse(payload).unwrap_err();
            assert!(
                matches!(err, AppError::MalformedControlMessage(_)),
                "{} -> {:?}",
                payload,
                err
            );
        }
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(Notice::ResizeDone.to_text(), "resize_done");
        assert_eq!(Notice::Error("x".into()).to_text(), "error: x");
        assert_eq!(Notice::Warning("y".into()).to_string(), "warning: y");
    }
}
