//! Rate limiter adapters.
//!
//! Implementations of the CounterStore port plus the pieces that choose
//! between them at runtime.
//!
//! ## Available Adapters
//!
//! - `RedisCounterStore` - Exact sliding window shared across servers
//! - `InMemoryCounterStore` - Fixed window, in-process fallback
//! - `StoreSelector` - Picks the healthy store for each request
//! - `RateLimitRuntime` - Builds the stores and owns their background tasks
//!
//! ## Usage
//!
//! ```ignore
//! use api_shield::adapters::rate_limiter::RateLimitRuntime;
//!
//! let runtime = RateLimitRuntime::init(&config.rate_limit, config.redis.as_ref()).await?;
//! let selector = runtime.selector().clone();
//! // ... serve requests ...
//! runtime.shutdown().await;
//! ```

mod in_memory;
mod redis;
mod runtime;
mod selector;

pub mod testing;

pub use in_memory::InMemoryCounterStore;
pub use redis::{RedisCounterStore, DEFAULT_KEY_PREFIX};
pub use runtime::RateLimitRuntime;
pub use selector::StoreSelector;
