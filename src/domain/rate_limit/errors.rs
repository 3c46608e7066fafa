//! Errors raised while building rate limit policies.
//!
//! All of these are configuration-time failures. None of them can occur while
//! a request is being checked.

use thiserror::Error;

/// A policy definition that cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("invalid time window: '{0}'")]
    InvalidTimeWindow(String),

    #[error("request limit for policy '{0}' must be at least 1")]
    InvalidLimit(String),

    #[error("invalid route pattern: '{0}'")]
    InvalidRoutePattern(String),

    #[error("duplicate route pattern: '{0}'")]
    DuplicateRoute(String),

    #[error("unknown key strategy: '{0}'")]
    UnknownKeyStrategy(String),
}
