//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `clock` - System and manual clocks
//! - `rate_limiter` - Counter stores (Redis, in-memory) and their runtime
//! - `http` - axum router and rate limit middleware

pub mod clock;
pub mod http;
pub mod rate_limiter;

pub use clock::{ManualClock, SystemClock};
pub use rate_limiter::{InMemoryCounterStore, RateLimitRuntime, RedisCounterStore, StoreSelector};
