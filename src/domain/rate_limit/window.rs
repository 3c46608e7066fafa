//! Human-readable rate limit windows (`"15m"`, `"1h"`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::PolicyError;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_DAY: u64 = 86_400;

/// Longest accepted window. Redis must accept it as an `EXPIRE` argument.
pub const MAX_WINDOW_SECS: u64 = 365 * SECS_PER_DAY;

/// Length of a rate limit window, in whole seconds.
///
/// Always positive and at most [`MAX_WINDOW_SECS`]. Parsed once when the
/// policy table is loaded and never on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowSpec {
    seconds: u64,
}

impl WindowSpec {
    /// Parses `<digits><unit>` where unit is one of `s`, `m`, `h`, `d`.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidTimeWindow` for a missing or unknown unit,
    /// a zero magnitude, any sign or whitespace, or a value that overflows or
    /// exceeds [`MAX_WINDOW_SECS`].
    pub fn parse(text: &str) -> Result<Self, PolicyError> {
        let invalid = || PolicyError::InvalidTimeWindow(text.to_string());

        let unit = text.chars().last().ok_or_else(invalid)?;
        let multiplier = match unit {
            's' => 1,
            'm' => SECS_PER_MINUTE,
            'h' => SECS_PER_HOUR,
            'd' => SECS_PER_DAY,
            _ => return Err(invalid()),
        };

        let digits = &text[..text.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let magnitude: u64 = digits.parse().map_err(|_| invalid())?;
        let seconds = magnitude.checked_mul(multiplier).ok_or_else(invalid)?;

        Self::from_secs(seconds).ok_or_else(invalid)
    }

    /// Builds a window from a number of seconds, `None` for zero or anything
    /// above [`MAX_WINDOW_SECS`].
    pub fn from_secs(seconds: u64) -> Option<Self> {
        (seconds > 0 && seconds <= MAX_WINDOW_SECS).then_some(Self { seconds })
    }

    /// Window length in seconds.
    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Window length in milliseconds.
    pub fn millis(&self) -> u64 {
        self.seconds.saturating_mul(1000)
    }
}

impl fmt::Display for WindowSpec {
    /// Renders the largest unit that divides the window evenly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % SECS_PER_DAY == 0 {
            write!(f, "{}d", s / SECS_PER_DAY)
        } else if s % SECS_PER_HOUR == 0 {
            write!(f, "{}h", s / SECS_PER_HOUR)
        } else if s % SECS_PER_MINUTE == 0 {
            write!(f, "{}m", s / SECS_PER_MINUTE)
        } else {
            write!(f, "{}s", s)
        }
    }
}

impl FromStr for WindowSpec {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for WindowSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WindowSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
