//! API Shield - Route-aware request rate limiting for axum services
//!
//! This crate counts requests per client, route and policy, sharing counters
//! through Redis when it is reachable and falling back to in-process counting
//! when it is not.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
