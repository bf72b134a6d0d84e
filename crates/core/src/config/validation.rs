//! Configuration validation rules.
//!
//! This module provides validation logic for `CacheConfig` values
//! after they have been loaded from environment, files, or defaults.

use thiserror::Error;

use crate::config::CacheConfig;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `sweep_interval_secs` is 0 or exceeds one day
    /// - `stale_time_ms` is 0 or `gc_time_ms` is shorter than it
    /// - `retry_base_delay_ms` is 0 or exceeds `retry_max_delay_ms`
    /// - `max_retries` exceeds 10
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.sweep_interval_secs > 86_400 {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_secs".into(),
                reason: "must not exceed one day (86400s)".into(),
            });
        }

        if self.stale_time_ms == 0 {
            return Err(ConfigError::Invalid { field: "stale_time_ms".into(), reason: "must be greater than 0".into() });
        }
        if self.gc_time_ms < self.stale_time_ms {
            return Err(ConfigError::Invalid {
                field: "gc_time_ms".into(),
                reason: "must not be shorter than stale_time_ms".into(),
            });
        }

        if self.max_retries > 10 {
            return Err(ConfigError::Invalid { field: "max_retries".into(), reason: "must not exceed 10".into() });
        }
        if self.retry_base_delay_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "retry_base_delay_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "retry_base_delay_ms".into(),
                reason: "must not exceed retry_max_delay_ms".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if let Some(url) = &self.api_base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                field: "api_base_url".into(),
                reason: "must start with http:// or https://".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(config: CacheConfig) -> String {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_sweep_interval() {
        assert_eq!(invalid_field(CacheConfig { sweep_interval_secs: 0, ..Default::default() }), "sweep_interval_secs");
        assert_eq!(
            invalid_field(CacheConfig { sweep_interval_secs: 86_401, ..Default::default() }),
            "sweep_interval_secs"
        );
    }

    #[test]
    fn test_validate_windows() {
        assert_eq!(invalid_field(CacheConfig { stale_time_ms: 0, ..Default::default() }), "stale_time_ms");
        assert_eq!(invalid_field(CacheConfig { gc_time_ms: 1000, ..Default::default() }), "gc_time_ms");
    }

    #[test]
    fn test_validate_retry_settings() {
        assert_eq!(invalid_field(CacheConfig { max_retries: 11, ..Default::default() }), "max_retries");
        assert_eq!(invalid_field(CacheConfig { retry_base_delay_ms: 0, ..Default::default() }), "retry_base_delay_ms");
        assert_eq!(
            invalid_field(CacheConfig { retry_base_delay_ms: 60_000, ..Default::default() }),
            "retry_base_delay_ms"
        );
    }

    #[test]
    fn test_validate_timeout_bounds() {
        assert_eq!(invalid_field(CacheConfig { timeout_ms: 50, ..Default::default() }), "timeout_ms");
        assert_eq!(invalid_field(CacheConfig { timeout_ms: 301_000, ..Default::default() }), "timeout_ms");
        assert!(CacheConfig { timeout_ms: 100, ..Default::default() }.validate().is_ok());
        assert!(CacheConfig { timeout_ms: 300_000, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_user_agent() {
        assert_eq!(invalid_field(CacheConfig { user_agent: String::new(), ..Default::default() }), "user_agent");
    }

    #[test]
    fn test_validate_api_base_url_scheme() {
        let config = CacheConfig { api_base_url: Some("ftp://example.com".into()), ..Default::default() };
        assert_eq!(invalid_field(config), "api_base_url");
    }
}
