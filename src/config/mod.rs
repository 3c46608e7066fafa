//! Application configuration module
//!
//! This module provides type-safe configuration loading using the `config`
//! and `dotenvy` crates. Values come from an optional config file (policy
//! tables live there) and from environment variables with the `API_SHIELD`
//! prefix, where nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use api_shield::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod error;
mod rate_limit;
mod redis;
mod server;

pub use error::{ConfigError, ValidationError};
pub use rate_limit::{PolicySettings, RateLimitConfig};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;
use std::path::Path;

/// Environment variable naming an explicit config file.
pub const CONFIG_FILE_ENV: &str = "API_SHIELD_CONFIG";

/// Config file looked up (without extension) when no explicit file is named.
const DEFAULT_CONFIG_FILE: &str = "config/api-shield";

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration; absent means local-only counting
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// Rate limit policies
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads the file named by `API_SHIELD_CONFIG`, or `config/api-shield.*` if present
    /// 3. Reads environment variables with `API_SHIELD` prefix
    /// 4. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `API_SHIELD__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `API_SHIELD__REDIS__URL=redis://...` -> `redis.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a named file is missing or values cannot be
    /// parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let file = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => config::File::with_name(&path).required(true),
            Err(_) => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Self::build(file)
    }

    /// Load configuration from an explicit file plus environment variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build(file: config::File<config::FileSourceFile, config::FileFormat>) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::default()
                    .prefix("API_SHIELD")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Builds the policy table once so that a malformed policy aborts
    /// startup instead of surfacing on a request.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        if let Some(redis) = &self.redis {
            redis.validate()?;
        }
        self.rate_limit.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear environment variables after testing
    fn clear_env() {
        env::remove_var("API_SHIELD__REDIS__URL");
        env::remove_var("API_SHIELD__SERVER__PORT");
        env::remove_var("API_SHIELD__SERVER__ENVIRONMENT");
        env::remove_var(CONFIG_FILE_ENV);
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const POLICY_FILE: &str = r#"
rate_limit:
  sweep_interval_secs: 30
  default:
    limit: 100
    window: "1m"
  policies:
    - route: "/api/auth/signin"
      name: "auth"
      limit: 5
      window: "15m"
    - route: "/api/admin/*"
      limit: 300
      window: "1h"
      key_strategy: "user"
"#;

    #[test]
    fn test_load_without_any_source_uses_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.redis.is_none());
        assert_eq!(config.server.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_policies_from_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let file = write_config(POLICY_FILE);
        let result = AppConfig::load_from(file.path());

        let config = result.unwrap();
        assert_eq!(config.rate_limit.sweep_interval_secs, 30);
        assert_eq!(config.rate_limit.policies.len(), 2);

        let table = config.rate_limit.build_table().unwrap();
        assert_eq!(table.resolve("/api/auth/signin").request_limit(), 5);
        assert_eq!(table.resolve("/api/admin/users").request_limit(), 300);
    }

    #[test]
    fn test_config_file_env_var_is_honoured() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let file = write_config(POLICY_FILE);
        env::set_var(CONFIG_FILE_ENV, file.path());
        let result = AppConfig::load();
        clear_env();

        assert_eq!(result.unwrap().rate_limit.policies.len(), 2);
    }

    #[test]
    fn test_redis_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("API_SHIELD__REDIS__URL", "redis://localhost:6379");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        let redis = config.redis.expect("redis section should be present");
        assert!(redis.validate().is_ok());
    }

    #[test]
    fn test_malformed_policy_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let file = write_config(
            r#"
rate_limit:
  default:
    limit: 100
    window: "bogus"
"#,
        );
        let config = AppConfig::load_from(file.path()).unwrap();

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("API_SHIELD__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        assert!(result.unwrap().is_production());
    }

    #[test]
    fn test_custom_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("API_SHIELD__SERVER__PORT", "3000");
        let result = AppConfig::load();
        clear_env();

        assert_eq!(result.unwrap().server.port, 3000);
    }
}
