//! Redis-backed counter store for multi-server deployments.
//!
//! Keeps an exact sliding-window log per key in a sorted set. Each increment
//! runs as one `MULTI`/`EXEC` transaction:
//! 1. `ZREMRANGEBYSCORE` drops events older than the window
//! 2. `ZCARD` counts what is left
//! 3. `ZADD` records this request, scored by its timestamp
//! 4. `EXPIRE` lets abandoned keys clean themselves up
//!
//! Either every step applies or none does, so concurrent callers never lose
//! an update. Commands are bounded by a timeout; failures mark the store
//! unhealthy until the health probe sees Redis answer again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::{watch, RwLock};
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::adapters::clock::SystemClock;
use crate::ports::{Clock, CounterSnapshot, CounterStore, StoreError, StoreKind};

/// Default namespace for counter keys.
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit:";

/// Redis-backed sliding-window counter store.
pub struct RedisCounterStore {
    client: redis::Client,
    conn: RwLock<Option<MultiplexedConnection>>,
    healthy: AtomicBool,
    key_prefix: String,
    connect_timeout: Duration,
    command_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisCounterStore {
    /// Creates a store for `url` without connecting.
    ///
    /// The store reports unhealthy until [`connect`](Self::connect) or the
    /// health probe establishes a connection.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the URL cannot be parsed.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            conn: RwLock::new(None),
            healthy: AtomicBool::new(false),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_millis(250),
            clock: Arc::new(SystemClock),
        })
    }

    /// Sets the namespace prepended to every key.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets how long a connection attempt may take.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how long a single transaction may take before it counts as failed.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Replaces the clock used to score events.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Establishes the shared connection and marks the store healthy.
    pub async fn connect(&self) -> Result<(), StoreError> {
        let conn = match time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(StoreError::Transport(e.to_string())),
            Err(_) => return Err(StoreError::Timeout(self.connect_timeout)),
        };

        *self.conn.write().await = Some(conn);
        self.healthy.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Checks Redis with `PING`, reconnecting when there is no connection.
    ///
    /// Updates and returns the health flag.
    pub async fn probe(&self) -> bool {
        let existing = self.conn.read().await.clone();

        let healthy = match existing {
            Some(mut conn) => {
                let ping = redis::cmd("PING");
                match time::timeout(self.command_timeout, ping.query_async::<_, ()>(&mut conn))
                    .await
                {
                    Ok(Ok(())) => true,
                    _ => {
                        // Broken multiplexed connections do not recover; reconnect next time
                        *self.conn.write().await = None;
                        false
                    }
                }
            }
            None => self.connect().await.is_ok(),
        };

        let was_healthy = self.healthy.swap(healthy, Ordering::SeqCst);
        if healthy && !was_healthy {
            tracing::info!("Redis counter store is reachable, using distributed counting");
        } else if !healthy && was_healthy {
            tracing::warn!("Redis counter store is unreachable, using local counting");
        }
        healthy
    }

    /// Probes Redis on a fixed interval until `shutdown` flips to `true`.
    pub async fn run_health_probe(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("Redis health probe stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.probe().await;
                }
            }
        }
    }

    /// Returns the namespaced Redis key.
    pub fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Unavailable("not connected".to_string()))
    }

    fn record_failure(&self, error: StoreError) -> StoreError {
        if self.healthy.swap(false, Ordering::SeqCst) {
            tracing::warn!(error = %error, "Redis counter store failed, marking unhealthy");
        }
        error
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_and_count(
        &self,
        key: &str,
        window_secs: u64,
    ) -> Result<CounterSnapshot, StoreError> {
        let mut conn = self.connection().await?;

        let redis_key = self.redis_key(key);
        let now_ms = self.clock.now().as_unix_millis();
        let window_ms = window_secs.saturating_mul(1000);
        let window_start_ms = now_ms.saturating_sub(window_ms);
        // Same-millisecond events need distinct members
        let member = format!("{}-{}", now_ms, Uuid::new_v4());

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg("-inf")
            .arg(window_start_ms)
            .ignore()
            .cmd("ZCARD")
            .arg(&redis_key)
            .cmd("ZADD")
            .arg(&redis_key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            .cmd("EXPIRE")
            .arg(&redis_key)
            .arg(window_secs)
            .ignore();

        let (previous,): (u64,) =
            match time::timeout(self.command_timeout, pipe.query_async::<_, (u64,)>(&mut conn)).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => return Err(self.record_failure(StoreError::Transport(e.to_string()))),
                Err(_) => return Err(self.record_failure(StoreError::Timeout(self.command_timeout))),
            };

        Ok(CounterSnapshot {
            count: previous + 1,
            reset_at_ms: now_ms.saturating_add(window_ms),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let del = redis::cmd("DEL").arg(self.redis_key(key)).to_owned();

        match time::timeout(self.command_timeout, del.query_async::<_, ()>(&mut conn)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.record_failure(StoreError::Transport(e.to_string()))),
            Err(_) => Err(self.record_failure(StoreError::Timeout(self.command_timeout))),
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Distributed
    }
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("key_prefix", &self.key_prefix)
            .field("healthy", &self.is_healthy())
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}
