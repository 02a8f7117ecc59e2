//! Log throttling utility
//!
//! Limits how often the same message is recorded so a broken source or a
//! stalled client cannot flood the log once per frame.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    last_logged: Instant,
    /// Calls swallowed since `last_logged`
    suppressed: u64,
}

/// Log throttler that limits how often the same message is logged
///
/// Keys are free-form; per-connection keys are usually built as
/// `"<kind>:<connection id>"` so they can be dropped together on teardown.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use viewport_stream::utils::LogThrottler;
///
/// let throttler = LogThrottler::new(Duration::from_secs(5));
///
/// // First call returns true
/// assert!(throttler.should_log("convert"));
///
/// // Subsequent calls within 5 seconds return false
/// assert!(!throttler.should_log("convert"));
/// ```
pub struct LogThrottler {
    entries: RwLock<HashMap<String, Entry>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            interval,
        }
    }

    /// Create a new log throttler with interval specified in seconds
    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Check if a message should be logged (not throttled)
    pub fn should_log(&self, key: &str) -> bool {
        self.check(key).is_some()
    }

    /// Like `should_log`, but on success also returns how many calls were
    /// suppressed since the key was last logged
    pub fn check(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if now.duration_since(entry.last_logged) < self.interval => {
                entry.suppressed += 1;
                None
            }
            Some(entry) => {
                let suppressed = entry.suppressed;
                entry.last_logged = now;
                entry.suppressed = 0;
                Some(suppressed)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        last_logged: now,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }

    /// Clear throttle state for a specific key
    ///
    /// Call when an error condition recovers so the next failure is logged
    /// immediately.
    pub fn clear(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Clear every key ending with `suffix` (e.g. a connection id)
    pub fn clear_suffix(&self, suffix: &str) {
        self.entries.write().retain(|key, _| !key.ends_with(suffix));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for LogThrottler {
    /// Create a default log throttler with 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

/// Macro for throttled warning logging
///
/// # Example
///
/// ```rust
/// use viewport_stream::utils::LogThrottler;
/// use viewport_stream::warn_throttled;
///
/// let throttler = LogThrottler::default();
/// warn_throttled!(throttler, "my_error", "Error occurred: {}", "details");
/// ```
#[macro_export]
macro_rules! warn_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::warn!($($arg)*);
        }
    };
}

/// Macro for throttled error logging
#[macro_export]
macro_rules! error_throttled {
    ($throttler:expr, $key:expr, $($arg:tt)*) => {
        if $throttler.should_log($key) {
            tracing::error!($($arg)*);
        }
    };
}
