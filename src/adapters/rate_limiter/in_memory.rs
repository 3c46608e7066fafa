//! In-memory counter store, the fallback when Redis is unreachable.
//!
//! Uses a fixed-window counter per key in a sharded concurrent map. This is
//! looser than the Redis sliding log (a client can burst across a window
//! boundary), which is accepted for degraded-mode operation.
//!
//! Each key is mutated under its shard's entry lock, so increments of one key
//! never race while different keys proceed concurrently. Expired windows are
//! replaced on the next access and removed by a periodic sweep.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::adapters::clock::SystemClock;
use crate::ports::{Clock, CounterSnapshot, CounterStore, StoreError, StoreKind};

/// In-process counter store.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    /// Per-key window state.
    windows: DashMap<String, WindowState>,
    clock: Arc<dyn Clock>,
}

/// State for a single fixed window.
#[derive(Debug, Clone, Copy)]
struct WindowState {
    /// Requests seen in the current window.
    count: u64,
    /// When the current window ends (Unix milliseconds).
    reset_at_ms: u64,
}

impl InMemoryCounterStore {
    /// Creates a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Removes every window that has ended. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now().as_unix_millis();
        let mut removed = 0;
        self.windows.retain(|_, state| {
            let live = state.reset_at_ms > now;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drops all tracked windows.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Runs the periodic sweep until `shutdown` flips to `true`.
    ///
    /// The sweep is driven by its own timer and does not depend on request
    /// traffic.
    pub async fn run_sweeper(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Local counter sweep stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let removed = self.sweep_expired();
                    if removed > 0 {
                        tracing::debug!(removed, tracked = self.len(), "Swept expired rate limit windows");
                    }
                }
            }
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_count(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        if window_secs == 0 {
            return Err(StoreError::Internal("window must be positive".to_string()));
        }

        let now = self.clock.now().as_unix_millis();
        let fresh = WindowState {
            count: 0,
            reset_at_ms: now.saturating_add(window_secs.saturating_mul(1000)),
        };

        let mut state = self.windows.entry(key.to_string()).or_insert(fresh);

        // Window ended: start a new one
        if state.reset_at_ms <= now {
            *state = fresh;
        }

        state.count += 1;

        Ok(CounterSnapshot {
            count: state.count,
            reset_at_ms: state.reset_at_ms,
        })
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.windows.remove(key);
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }
}
