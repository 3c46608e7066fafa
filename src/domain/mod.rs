//! Domain layer containing rate limiting rules and value types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (timestamps)
//! - `rate_limit` - Time windows, policies, key strategies, and decisions

pub mod foundation;
pub mod rate_limit;
