// src/utils/time.rs
//! Wall-clock access and whole-second alignment helpers
//!
//! All timestamps in the crate are nanoseconds since the Unix epoch (`u64`).
//! Window boundaries are aligned to whole wall-clock seconds, so the clock is
//! injected through [`TimeProvider`] to make the cadence testable.

use crate::utils::cancel::CancellationToken;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds per second
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Time provider trait for dependency injection and testing
pub trait TimeProvider: Send + Sync {
    fn now_nanos(&self) -> u64;

    /// Sleep for `duration` or until `cancel` fires. Returns true when cancelled.
    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        cancel.wait_timeout(duration)
    }
}

/// System time provider using the real wall clock
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_nanos(&self) -> u64 {
        current_timestamp_nanos()
    }
}

/// Mock time provider for deterministic testing
///
/// `sleep` advances the virtual clock instead of blocking.
pub struct MockTimeProvider {
    current_time: AtomicU64,
}

impl MockTimeProvider {
    pub fn new(initial_time_nanos: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time_nanos),
        }
    }

    pub fn advance_by(&self, nanos: u64) {
        self.current_time.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn set_time(&self, nanos: u64) {
        self.current_time.store(nanos, Ordering::Relaxed);
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_nanos(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed)
    }

    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return true;
        }
        self.advance_by(duration.as_nanos() as u64);
        cancel.is_cancelled()
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Round a timestamp down to the start of its second
pub fn floor_to_second(timestamp_nanos: u64) -> u64 {
    timestamp_nanos - timestamp_nanos % NANOS_PER_SECOND
}

/// Delay to the next multiple of `interval` since the epoch
pub fn delay_to_next_interval(timestamp_nanos: u64, interval: Duration) -> Duration {
    let interval_ns = (interval.as_nanos() as u64).max(1);
    Duration::from_nanos(interval_ns - timestamp_nanos % interval_ns)
}

/// Sample period in nanoseconds for a rate in Hz
pub fn sample_period_nanos(rate_hz: f64) -> u64 {
    if rate_hz <= 0.0 {
        return 0;
    }
    (NANOS_PER_SECOND as f64 / rate_hz).round() as u64
}

/// Convert epoch nanoseconds into a UTC date-time
pub fn to_datetime(timestamp_nanos: u64) -> DateTime<Utc> {
    let secs = (timestamp_nanos / NANOS_PER_SECOND) as i64;
    let nanos = (timestamp_nanos % NANOS_PER_SECOND) as u32;
    DateTime::from_timestamp(secs, nanos).unwrap_or_default()
}

/// ISO-8601 timestamp without colons, safe for file names
/// (`2024-05-01T120000.000000`)
pub fn format_compact_iso(timestamp_nanos: u64) -> String {
    to_datetime(timestamp_nanos)
        .format("%Y-%m-%dT%H%M%S%.6f")
        .to_string()
}
