//! Lifecycle owner for the counter stores.
//!
//! `RateLimitRuntime::init` builds the local store and, when configured, the
//! Redis store, then starts the background work: the local sweep and the
//! Redis health probe. `shutdown` stops both and drops local state.
//!
//! An unreachable Redis at startup is not fatal. The runtime starts in local
//! mode and the health probe switches to distributed counting once Redis
//! answers.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::adapters::clock::SystemClock;
use crate::config::{RateLimitConfig, RedisConfig};
use crate::ports::{Clock, CounterStore, StoreError};

use super::in_memory::InMemoryCounterStore;
use super::redis::RedisCounterStore;
use super::selector::StoreSelector;

use secrecy::ExposeSecret;

/// Owns the stores and their background tasks.
pub struct RateLimitRuntime {
    selector: StoreSelector,
    clock: Arc<dyn Clock>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RateLimitRuntime {
    /// Builds the stores and spawns the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` only if the Redis URL cannot be
    /// parsed. Connection failures are logged and tolerated.
    pub async fn init(
        rate_limit: &RateLimitConfig,
        redis: Option<&RedisConfig>,
    ) -> Result<Self, StoreError> {
        Self::init_with_clock(rate_limit, redis, Arc::new(SystemClock)).await
    }

    /// Same as [`init`](Self::init) with an explicit clock.
    pub async fn init_with_clock(
        rate_limit: &RateLimitConfig,
        redis: Option<&RedisConfig>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let local = Arc::new(InMemoryCounterStore::with_clock(Arc::clone(&clock)));
        {
            let local = Arc::clone(&local);
            let interval = rate_limit.sweep_interval();
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                local.run_sweeper(interval, shutdown).await;
            }));
        }

        let distributed = match redis {
            Some(config) => {
                let store = Arc::new(
                    RedisCounterStore::open(config.url.expose_secret())?
                        .with_key_prefix(config.key_prefix.clone())
                        .with_connect_timeout(config.timeout())
                        .with_command_timeout(config.command_timeout())
                        .with_clock(Arc::clone(&clock)),
                );

                match store.connect().await {
                    Ok(()) => tracing::info!("Connected to Redis, using distributed counting"),
                    Err(e) => tracing::warn!(
                        error = %e,
                        "Redis unreachable at startup, counting locally until it recovers"
                    ),
                }

                let probe = Arc::clone(&store);
                let interval = config.health_check_interval();
                let shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    probe.run_health_probe(interval, shutdown).await;
                }));

                Some(store as Arc<dyn CounterStore>)
            }
            None => {
                tracing::info!("No Redis configured, counting locally");
                None
            }
        };

        Ok(Self {
            selector: StoreSelector::new(distributed, local),
            clock,
            shutdown_tx,
            tasks,
        })
    }

    /// The selector requests are counted through.
    pub fn selector(&self) -> &StoreSelector {
        &self.selector
    }

    /// The clock the stores count with. Limiters built on this runtime
    /// should share it so reset times and retry hints agree.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Number of background tasks still owned by the runtime.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops the background tasks and clears local state.
    pub async fn shutdown(mut self) {
        // Receivers may already be gone; nothing to signal then
        let _ = self.shutdown_tx.send(true);

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Rate limit background task ended abnormally");
            }
        }

        self.selector.local().clear();
        tracing::info!("Rate limit runtime stopped");
    }
}

impl std::fmt::Debug for RateLimitRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitRuntime")
            .field("selector", &self.selector)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
