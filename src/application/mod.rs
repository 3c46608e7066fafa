//! Application layer - orchestration between domain and ports.
//!
//! The rate limiter combines the policy table (domain) with a counter store
//! (port) and turns each request into a decision.

mod rate_limiter;

pub use rate_limiter::RateLimiter;
