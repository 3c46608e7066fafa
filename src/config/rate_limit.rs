//! Rate limit policy configuration
//!
//! Policies come from the config file (YAML, TOML or JSON):
//!
//! ```yaml
//! rate_limit:
//!   sweep_interval_secs: 60
//!   default:
//!     limit: 100
//!     window: "1m"
//!   policies:
//!     - route: "/api/auth/signin"
//!       name: "auth"
//!       limit: 5
//!       window: "15m"
//!     - route: "/api/admin/*"
//!       limit: 300
//!       window: "1h"
//!       key_strategy: "user"
//! ```
//!
//! When the section is present its `default` entry is required. Every entry
//! is checked when the table is built; one bad entry fails startup.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::rate_limit::{
    KeyStrategyKind, Policy, PolicyTable, WindowSpec, DEFAULT_POLICY_NAME,
};

use super::error::ValidationError;

/// Rate limit configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Policy for routes no other entry matches.
    pub default: PolicySettings,

    /// Route-specific policies.
    #[serde(default)]
    pub policies: Vec<PolicySettings>,

    /// How often the local store drops expired windows, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// One policy entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Literal path or `prefix/*`. Ignored on the default entry.
    #[serde(default)]
    pub route: Option<String>,

    /// Policy name. Defaults to the route pattern.
    #[serde(default)]
    pub name: Option<String>,

    /// Requests allowed per window.
    pub limit: u32,

    /// Window length, e.g. `"15m"`.
    pub window: String,

    /// `ip` (default), `user`, or `global`.
    #[serde(default)]
    pub key_strategy: Option<String>,
}

impl PolicySettings {
    /// Creates an IP-keyed entry.
    pub fn new(limit: u32, window: impl Into<String>) -> Self {
        Self {
            route: None,
            name: None,
            limit,
            window: window.into(),
            key_strategy: None,
        }
    }

    /// Binds the entry to a route pattern.
    pub fn for_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn keyed_by(mut self, strategy: KeyStrategyKind) -> Self {
        self.key_strategy = Some(strategy.as_str().to_string());
        self
    }

    fn to_policy(&self, fallback_name: &str) -> Result<Policy, ValidationError> {
        let window = WindowSpec::parse(&self.window)?;
        let strategy = match &self.key_strategy {
            Some(name) => name.parse::<KeyStrategyKind>()?,
            None => KeyStrategyKind::default(),
        };
        let name = self.name.as_deref().unwrap_or(fallback_name);

        Ok(Policy::new(name, self.limit, window)?.with_key_strategy(strategy.strategy()))
    }
}

impl RateLimitConfig {
    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Builds the policy table.
    ///
    /// # Errors
    ///
    /// Fails on the first entry with a bad window, limit, key strategy, or
    /// route pattern, and on a route registered twice.
    pub fn build_table(&self) -> Result<PolicyTable, ValidationError> {
        let mut table = PolicyTable::new(self.default.to_policy(DEFAULT_POLICY_NAME)?);

        for (index, entry) in self.policies.iter().enumerate() {
            let route = entry
                .route
                .as_deref()
                .ok_or(ValidationError::MissingRoute(index))?;
            table.insert(route, entry.to_policy(route)?)?;
        }

        Ok(table)
    }

    /// Validate rate limit configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("rate_limit.sweep_interval_secs"));
        }
        self.build_table()?;
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: PolicySettings::new(100, "1m"),
            policies: Vec::new(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}
