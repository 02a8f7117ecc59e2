//! Encoding options model
//!
//! Clients send free-form `name -> value` string maps. They are layered on
//! top of built-in rate-control defaults and a per-kind profile before being
//! handed to a backend; unknown keys are passed through untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::traits::BackendKind;

/// Reserved option key selecting the backend instead of configuring it
pub const CODEC_KEY: &str = "codec";

/// Option name aliases accepted from clients (alias, canonical)
const ALIASES: [(&str, &str); 4] = [
    ("bit_rate", "b"),
    ("bitrate", "b"),
    ("gop_size", "g"),
    ("max_b_frames", "bf"),
];

/// String-to-string option map (ordering irrelevant)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodingOptions(BTreeMap<String, String>);

impl EncodingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay `other` on top of `self`; keys in `other` win
    pub fn merge(&mut self, other: &EncodingOptions) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    /// Remove and return the `codec` selector, if present
    pub fn take_codec(&mut self) -> Option<String> {
        self.remove(CODEC_KEY).filter(|c| !c.trim().is_empty())
    }

    /// Rewrite alias keys to their canonical names
    pub fn normalized(mut self) -> Self {
        for (alias, canonical) in ALIASES {
            if let Some(value) = self.remove(alias) {
                self.insert(canonical, value);
            }
        }
        self
    }

    /// Parse a numeric option, accepting `k`/`M`/`G` suffixes
    pub fn get_scaled(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(parse_scaled)
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get_scaled(key).and_then(|v| u32::try_from(v).ok())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EncodingOptions {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parse "400k", "1.5M", "800000" into an integer
pub fn parse_scaled(value: &str) -> Option<u64> {
    let value = value.trim();
    let (number, scale) = match value.chars().last()? {
        'k' | 'K' => (&value[..value.len() - 1], 1_000.0),
        'm' | 'M' => (&value[..value.len() - 1], 1_000_000.0),
        'g' | 'G' => (&value[..value.len() - 1], 1_000_000_000.0),
        _ => (value, 1.0),
    };
    let number: f64 = number.trim().parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Some((number * scale).round() as u64)
}

/// Parse a time base such as "1/60" into frames per second
pub fn parse_time_base(value: &str) -> Option<u32> {
    let (num, den) = value.split_once('/')?;
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    if num == 0 {
        return None;
    }
    Some(den / num).filter(|fps| *fps > 0)
}

/// Rate-control defaults shared by every backend
pub fn common_defaults() -> EncodingOptions {
    [
        ("b", "400k"),
        ("minrate", "100k"),
        ("maxrate", "800k"),
        ("bufsize", "1024k"),
        ("time_base", "1/60"),
        ("g", "10"),
        ("bf", "0"),
        ("keyint_min", "0"),
        ("i_qfactor", "0.71"),
        ("qcomp", "0.6"),
        ("qmin", "0"),
        ("qmax", "18"),
        ("qdiff", "4"),
        ("refs", "1"),
        ("trellis", "1"),
        ("delay", "0"),
    ]
    .into_iter()
    .collect()
}

/// Low-latency profile for a backend kind
pub fn profile_defaults(kind: BackendKind) -> EncodingOptions {
    match kind {
        BackendKind::Software => [
            ("preset", "ultrafast"),
            ("profile", "baseline"),
            ("level", "3.0"),
            ("tune", "zerolatency"),
        ]
        .into_iter()
        .collect(),
        BackendKind::Hardware => [
            ("preset", "llhp"),
            ("profile", "baseline"),
            ("zerolatency", "1"),
        ]
        .into_iter()
        .collect(),
    }
}

/// Build the effective option set for one session
///
/// Layering (later wins): common defaults, kind profile, server-configured
/// defaults, client options.
pub fn resolve_options(
    kind: BackendKind,
    configured: &EncodingOptions,
    client: &EncodingOptions,
) -> EncodingOptions {
    let mut options = common_defaults();
    options.merge(&profile_defaults(kind));
    options.merge(&configured.clone().normalized());
    options.merge(&client.clone().normalized());
    options.remove(CODEC_KEY);
    options
}

/// Typed rate-control knobs read from an option map
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    /// Average bitrate (bits/s)
    pub bitrate: u64,
    pub min_rate: u64,
    pub max_rate: u64,
    pub buffer_size: u64,
    /// Keyframe interval in frames
    pub gop_size: u32,
    pub max_b_frames: u32,
    pub qmin: u32,
    pub qmax: u32,
    pub fps: u32,
    pub preset: Option<String>,
    pub profile: Option<String>,
    /// Quality 1-100 for intra-only codecs
    pub quality: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate: 400_000,
            min_rate: 100_000,
            max_rate: 800_000,
            buffer_size: 1_024_000,
            gop_size: 10,
            max_b_frames: 0,
            qmin: 0,
            qmax: 18,
            fps: 60,
            preset: None,
            profile: None,
            quality: 80,
        }
    }
}

impl EncoderSettings {
    /// Read settings, falling back to defaults for absent or unparsable keys
    pub fn from_options(options: &EncodingOptions) -> Self {
        let defaults = Self::default();
        let quality = options
            .get_u32("quality")
            .or_else(|| options.get_u32("q"))
            .map(|q| q.clamp(1, 100) as u8)
            .unwrap_or(defaults.quality);

        Self {
            bitrate: options.get_scaled("b").unwrap_or(defaults.bitrate),
            min_rate: options.get_scaled("minrate").unwrap_or(defaults.min_rate),
            max_rate: options.get_scaled("maxrate").unwrap_or(defaults.max_rate),
            buffer_size: options.get_scaled("bufsize").unwrap_or(defaults.buffer_size),
            gop_size: options.get_u32("g").unwrap_or(defaults.gop_size),
            max_b_frames: options.get_u32("bf").unwrap_or(defaults.max_b_frames),
            qmin: options.get_u32("qmin").unwrap_or(defaults.qmin),
            qmax: options.get_u32("qmax").unwrap_or(defaults.qmax),
            fps: options
                .get("time_base")
                .and_then(parse_time_base)
                .or_else(|| options.get_u32("r"))
                .unwrap_or(defaults.fps),
            preset: options.get("preset").map(str::to_string),
            profile: options.get("profile").map(str::to_string),
            quality,
        }
    }
}
