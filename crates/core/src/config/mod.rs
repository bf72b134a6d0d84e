//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (STOCKCACHE_*)
//! 2. TOML config file (if STOCKCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::query::{QueryConfig, RetryPolicy};

mod validation;

pub use validation::ConfigError;

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (STOCKCACHE_*)
/// 2. TOML config file (if STOCKCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite persistent store.
    ///
    /// Set via STOCKCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Seconds between persistent-store sweeps.
    ///
    /// Set via STOCKCACHE_SWEEP_INTERVAL_SECS environment variable.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// In-memory freshness window in milliseconds.
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,

    /// Retention of unobserved in-memory queries in milliseconds.
    #[serde(default = "default_gc_time_ms")]
    pub gc_time_ms: u64,

    /// Automatic retries for transient query failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles per attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single retry delay in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Base URL of the backend API.
    ///
    /// Set via STOCKCACHE_API_BASE_URL environment variable.
    /// Required only for commands that reach the backend.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./stockcache.sqlite")
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_stale_time_ms() -> u64 {
    5 * 60 * 1000
}

fn default_gc_time_ms() -> u64 {
    10 * 60 * 1000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_user_agent() -> String {
    "stockcache/0.1".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stale_time_ms: default_stale_time_ms(),
            gc_time_ms: default_gc_time_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            api_base_url: None,
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl CacheConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Coordinator policy derived from this configuration.
    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            stale_time: Duration::from_millis(self.stale_time_ms),
            gc_time: Duration::from_millis(self.gc_time_ms),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.retry_max_delay_ms),
            },
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `STOCKCACHE_`
    /// 2. TOML file from `STOCKCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or parsed, or if
    /// validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STOCKCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STOCKCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Backend base URL, for commands that need it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the base URL is not set.
    pub fn require_api_base_url(&self) -> Result<&str, ConfigError> {
        self.api_base_url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "api_base_url".into(),
            hint: "Set STOCKCACHE_API_BASE_URL environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./stockcache.sqlite"));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.user_agent, "stockcache/0.1");
        assert!(config.api_base_url.is_none());
    }

    #[test]
    fn test_query_config_matches_fixed_policy() {
        assert_eq!(CacheConfig::default().query_config(), QueryConfig::default());
    }

    #[test]
    fn test_require_api_base_url() {
        let config = CacheConfig::default();
        assert!(matches!(config.require_api_base_url(), Err(ConfigError::Missing { .. })));

        let config = CacheConfig { api_base_url: Some("https://api.example.com".into()), ..Default::default() };
        assert_eq!(config.require_api_base_url().unwrap(), "https://api.example.com");
    }

    #[test]
    fn test_load_layers_file_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("stockcache.toml", "sweep_interval_secs = 60\nuser_agent = \"from-file\"")?;
            jail.set_env("STOCKCACHE_CONFIG_FILE", "stockcache.toml");
            jail.set_env("STOCKCACHE_USER_AGENT", "from-env");

            let config = CacheConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.sweep_interval_secs, 60);
            assert_eq!(config.user_agent, "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("STOCKCACHE_SWEEP_INTERVAL_SECS", "0");
            assert!(matches!(CacheConfig::load(), Err(ConfigError::Invalid { .. })));
            Ok(())
        });
    }
}
