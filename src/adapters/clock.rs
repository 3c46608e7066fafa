//! Clock adapters.
//!
//! - `SystemClock` - wall clock for production
//! - `ManualClock` - explicitly advanced clock for tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::Timestamp;
use crate::ports::Clock;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to a store
/// and advance time through another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at the given Unix milliseconds.
    pub fn at_millis(millis: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jumps to an absolute instant.
    pub fn set(&self, to: Timestamp) {
        self.now_ms.store(to.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_ms.load(Ordering::SeqCst))
    }
}
