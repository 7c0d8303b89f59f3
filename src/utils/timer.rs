//! Timer utilities
//!
//! Provides the event clock and a simple elapsed-time timer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Process-wide monotonic epoch shared by every [`Instant`]
fn epoch() -> std::time::Instant {
    static EPOCH: OnceLock<std::time::Instant> = OnceLock::new();
    *EPOCH.get_or_init(std::time::Instant::now)
}

/// A point in time carrying both a monotonic reading and a wall-clock reading.
///
/// The monotonic part orders events within one process; the wall-clock part
/// is what gets reported to humans and across process boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instant {
    /// Nanoseconds since the process epoch
    pub uptime_nanos: u64,

    /// Wall-clock time
    pub wall: DateTime<Utc>,
}

impl Instant {
    /// Capture the current instant
    pub fn now() -> Self {
        let uptime = epoch().elapsed();
        Self {
            uptime_nanos: u64::try_from(uptime.as_nanos()).unwrap_or(u64::MAX),
            wall: Utc::now(),
        }
    }

    /// Monotonic duration between `earlier` and `self`, zero if `earlier` is later
    pub fn duration_since(&self, earlier: &Instant) -> Duration {
        Duration::from_nanos(self.uptime_nanos.saturating_sub(earlier.uptime_nanos))
    }

    /// Seconds since the process epoch
    pub fn uptime_secs(&self) -> f64 {
        self.uptime_nanos as f64 / 1_000_000_000.0
    }

    /// Seconds since 1970-01-01T00:00:00Z
    pub fn since_1970(&self) -> f64 {
        self.wall.timestamp_micros() as f64 / 1_000_000.0
    }

    /// Rebuild an instant from its wire representation
    pub fn from_parts(uptime_secs: f64, since_1970: f64) -> Self {
        let micros = (since_1970 * 1_000_000.0).round() as i64;
        Self {
            uptime_nanos: (uptime_secs.max(0.0) * 1_000_000_000.0).round() as u64,
            wall: DateTime::from_timestamp_micros(micros).unwrap_or_default(),
        }
    }
}

/// Simple timer for measuring elapsed time
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
    label: String,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: std::time::Instant::now(),
            label: label.into(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Stop timer and return elapsed time
    pub fn stop(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::debug!("{}: {}ms", self.label, elapsed.as_millis());
        elapsed
    }
}

/// Render a duration the way recorders report it ("0.012")
pub fn format_seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}
