//! HTTP middleware for axum.
//!
//! - `rate_limit` - Per-route request limiting with rate limit headers

pub mod rate_limit;

pub use rate_limit::{headers, rate_limit_middleware, RateLimitExceeded, RateLimiterState};
