//! Test doubles for the counter store port.
//!
//! `FlakyStore` stands in for the Redis store: it counts correctly while
//! healthy, and can be told to report unhealthy or to fail every call.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::ports::{Clock, CounterSnapshot, CounterStore, StoreError, StoreKind};

use super::in_memory::InMemoryCounterStore;

/// Controllable distributed-store stand-in.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryCounterStore,
    healthy: AtomicBool,
    failing: AtomicBool,
    calls: AtomicUsize,
    resets: AtomicUsize,
}

impl FlakyStore {
    /// A store that reports healthy and counts normally.
    pub fn healthy() -> Self {
        let store = Self::default();
        store.set_healthy(true);
        store
    }

    /// A healthy store counting on `clock`, for tests that also drive the
    /// limiter's clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let store = Self {
            inner: InMemoryCounterStore::with_clock(clock),
            ..Self::default()
        };
        store.set_healthy(true);
        store
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// When set, every increment and reset fails with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Increments attempted against this store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for FlakyStore {
    async fn increment_and_count(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset by peer".to_string()));
        }
        self.inner.increment_and_count(key, window_secs).await
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection reset by peer".to_string()));
        }
        self.inner.reset(key).await
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Distributed
    }
}
