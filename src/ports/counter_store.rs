//! Counter store port for windowed request counting.
//!
//! A counter store answers one question: "record one more request for this
//! key and tell me how many there have been in the current window". The
//! Redis adapter keeps an exact sliding log; the in-memory adapter keeps a
//! fixed window and serves as the fallback when Redis is unreachable.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Port for windowed request counting.
///
/// Implementations must be thread-safe: concurrent increments of the same key
/// are linearized and never lost.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Records one request for `key` and returns the count in the current
    /// window, this request included.
    async fn increment_and_count(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<CounterSnapshot, StoreError>;

    /// Clears the counter for `key` (admin operation).
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Whether the backing connection is currently usable.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Which kind of store this is.
    fn kind(&self) -> StoreKind;
}

/// Result of a single increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Requests observed in the window, including the one just recorded.
    pub count: u64,
    /// When the window ends, in Unix milliseconds.
    pub reset_at_ms: u64,
}

/// Counter store variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Shared remote cache, exact sliding window.
    Distributed,
    /// In-process map, fixed window.
    Local,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Distributed => "distributed",
            StoreKind::Local => "local",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during counter store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Remote store could not be reached or rejected the command.
    #[error("counter store transport error: {0}")]
    Transport(String),

    /// Remote store did not answer in time.
    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),

    /// Store has no usable connection.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// Anything else that went wrong while counting.
    #[error("counter store failure: {0}")]
    Internal(String),
}

impl StoreError {
    /// Transport-level failures are recovered by switching stores.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StoreError::Transport(_) | StoreError::Timeout(_) | StoreError::Unavailable(_)
        )
    }
}
