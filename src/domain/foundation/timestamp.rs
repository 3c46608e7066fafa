//! Timestamp value object for immutable points in time.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC, millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Creates a timestamp from Unix milliseconds.
    ///
    /// Values outside chrono's representable range clamp to the epoch.
    pub fn from_unix_millis(millis: u64) -> Self {
        Self(
            Utc.timestamp_millis_opt(millis as i64)
                .single()
                .unwrap_or_default(),
        )
    }

    /// Creates a timestamp from Unix seconds.
    pub fn from_unix_secs(secs: u64) -> Self {
        Self::from_unix_millis(secs.saturating_mul(1000))
    }

    /// Returns the timestamp as Unix milliseconds.
    pub fn as_unix_millis(&self) -> u64 {
        self.0.timestamp_millis().max(0) as u64
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> u64 {
        self.0.timestamp().max(0) as u64
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}
