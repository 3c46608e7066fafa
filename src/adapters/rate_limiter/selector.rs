//! Chooses between the distributed and local counter stores.
//!
//! The choice is made again for every request: the distributed store is used
//! while it reports healthy, the local store otherwise. A distributed failure
//! on a single request is retried once against the local store, so callers
//! only see an error when the local store itself fails.
//!
//! The selector is itself a [`CounterStore`], so the limiter does not need to
//! know how many stores sit behind it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::ports::{CounterSnapshot, CounterStore, StoreError, StoreKind};

use super::in_memory::InMemoryCounterStore;

/// Health-driven store selection with per-request fallback.
#[derive(Clone)]
pub struct StoreSelector {
    distributed: Option<Arc<dyn CounterStore>>,
    local: Arc<InMemoryCounterStore>,
}

impl StoreSelector {
    /// Creates a selector. `distributed` is `None` when no remote cache is configured.
    pub fn new(distributed: Option<Arc<dyn CounterStore>>, local: Arc<InMemoryCounterStore>) -> Self {
        Self { distributed, local }
    }

    /// Creates a selector that always counts in-process.
    pub fn local_only(local: Arc<InMemoryCounterStore>) -> Self {
        Self::new(None, local)
    }

    /// Returns the store to use right now.
    pub fn current(&self) -> Arc<dyn CounterStore> {
        match &self.distributed {
            Some(store) if store.is_healthy() => Arc::clone(store),
            _ => self.local.clone() as Arc<dyn CounterStore>,
        }
    }

    /// Which store [`current`](Self::current) would pick.
    pub fn mode(&self) -> StoreKind {
        match &self.distributed {
            Some(store) if store.is_healthy() => StoreKind::Distributed,
            _ => StoreKind::Local,
        }
    }

    /// Whether a remote cache is configured at all.
    pub fn has_distributed(&self) -> bool {
        self.distributed.is_some()
    }

    /// The local fallback store.
    pub fn local(&self) -> &Arc<InMemoryCounterStore> {
        &self.local
    }
}

#[async_trait]
impl CounterStore for StoreSelector {
    /// Counts on the current store, falling back to the local store when the
    /// distributed store fails for this request.
    async fn increment_and_count(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        let store = self.current();

        match store.increment_and_count(key, window_secs).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) if store.kind() == StoreKind::Distributed => {
                tracing::warn!(error = %e, key, "Distributed counter failed, counting locally");
                self.local.increment_and_count(key, window_secs).await
            }
            Err(e) => Err(e),
        }
    }

    /// Clears `key` in every store that may hold it.
    ///
    /// Both stores are always attempted. A distributed failure is logged and
    /// does not fail the reset: that store is marked unhealthy by the failure,
    /// so counting continues on the local store, which has been cleared.
    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        if let Some(store) = &self.distributed {
            if let Err(e) = store.reset(key).await {
                tracing::warn!(error = %e, key, "Distributed counter reset failed");
            }
        }
        self.local.reset(key).await
    }

    fn kind(&self) -> StoreKind {
        self.mode()
    }
}

impl std::fmt::Debug for StoreSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSelector")
            .field("has_distributed", &self.has_distributed())
            .field("mode", &self.mode())
            .field("local_keys", &self.local.len())
            .finish()
    }
}
