//! Configuration error types

use thiserror::Error;

use crate::domain::rate_limit::PolicyError;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid bind address")]
    InvalidBindAddress,

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Redis command timeout must be between 1 and 10000 ms")]
    InvalidCommandTimeout,

    #[error("Interval must be at least one second: {0}")]
    InvalidInterval(&'static str),

    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    #[error("Rate limit policy #{0} has no route pattern")]
    MissingRoute(usize),
}
