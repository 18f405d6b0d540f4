//! Time source used throughout the crate so timestamps stay testable.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, fractional.
pub fn now_unix() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Milliseconds since the Unix epoch, for settings/log timestamps that want
/// integer precision.
pub fn now_unix_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
