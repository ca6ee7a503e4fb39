//! # Cache Configuration
//!
//! Environment-aware configuration for the two-tier cache. Values come from
//! a YAML file (see [`ConfigManager`]), from presets for test and
//! development, and from `TIERED_CACHE_*` environment variable overrides.
//!
//! ## Usage
//!
//! ```rust
//! use tiered_cache::config::CacheConfig;
//!
//! let config = CacheConfig::for_test();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.shared_tier.backend, "memory");
//! ```

pub mod error;
pub mod loader;

use crate::cache::Expiry;
use crate::constants::{self, backends};
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::info;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration for a [`crate::cache::CacheCoordinator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace prepended to every key in both tiers
    pub namespace: String,

    /// Lifetime applied when a write does not specify one (`<= 0` never expires)
    pub default_ttl_seconds: i64,

    /// In-process LRU tier
    pub hot_tier: HotTierConfig,

    /// Remote shared tier
    pub shared_tier: SharedTierConfig,

    /// Background refresh of entries close to expiry
    pub warming: WarmingConfig,

    /// Circuit breaker protecting the shared tier
    pub circuit_breaker: CircuitBreakerSettings,

    /// How long `shutdown` waits for background writes and refreshes
    pub shutdown_grace_ms: u64,
}

/// Hot tier (L1) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotTierConfig {
    pub max_entries: usize,
    /// TTL given to values promoted from the shared tier
    pub promotion_ttl_seconds: u64,
}

/// Shared tier (L2) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedTierConfig {
    pub enabled: bool,
    /// One of `redis`, `dragonfly`, `memory`, `noop`
    pub backend: String,
    pub url: String,
    pub connection_timeout_ms: u64,
    pub operation_timeout_ms: u64,
}

/// Cache warming configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmingConfig {
    pub enabled: bool,
    /// Fraction of the TTL remaining at or below which a refresh is scheduled
    pub threshold: f64,
}

/// YAML-facing circuit breaker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub success_threshold: u32,
}

impl Default for CacheConfig {
    /// Production defaults
    fn default() -> Self {
        Self {
            namespace: constants::DEFAULT_NAMESPACE.to_string(),
            default_ttl_seconds: constants::DEFAULT_TTL_SECONDS,
            hot_tier: HotTierConfig::default(),
            shared_tier: SharedTierConfig::default(),
            warming: WarmingConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            shutdown_grace_ms: constants::DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl Default for HotTierConfig {
    fn default() -> Self {
        Self {
            max_entries: constants::DEFAULT_HOT_TIER_MAX_ENTRIES,
            promotion_ttl_seconds: constants::DEFAULT_PROMOTION_TTL_SECONDS,
        }
    }
}

impl Default for SharedTierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: backends::REDIS.to_string(),
            url: constants::DEFAULT_SHARED_TIER_URL.to_string(),
            connection_timeout_ms: constants::DEFAULT_CONNECTION_TIMEOUT_MS,
            operation_timeout_ms: constants::DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

impl Default for WarmingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: constants::DEFAULT_WARMING_THRESHOLD,
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::for_shared_tier();
        Self {
            enabled: true,
            failure_threshold: defaults.failure_threshold,
            timeout_seconds: defaults.timeout.as_secs(),
            success_threshold: defaults.success_threshold,
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to the runtime breaker configuration
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_seconds),
            success_threshold: self.success_threshold,
        }
    }
}

impl SharedTierConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl CacheConfig {
    /// Test configuration: in-process shared tier, small capacity, short TTLs
    pub fn for_test() -> Self {
        Self {
            namespace: "test_cache".to_string(),
            default_ttl_seconds: 60,
            hot_tier: HotTierConfig {
                max_entries: 100,
                promotion_ttl_seconds: 5,
            },
            shared_tier: SharedTierConfig {
                backend: backends::MEMORY.to_string(),
                connection_timeout_ms: 500,
                operation_timeout_ms: 500,
                ..SharedTierConfig::default()
            },
            warming: WarmingConfig::default(),
            circuit_breaker: CircuitBreakerSettings {
                failure_threshold: 3,
                timeout_seconds: 5,
                ..CircuitBreakerSettings::default()
            },
            shutdown_grace_ms: 1000,
        }
    }

    /// Development configuration: local Redis, moderate TTLs
    pub fn for_development() -> Self {
        Self {
            default_ttl_seconds: 600,
            hot_tier: HotTierConfig {
                max_entries: 500,
                promotion_ttl_seconds: 50,
            },
            shared_tier: SharedTierConfig {
                connection_timeout_ms: 2000,
                operation_timeout_ms: 2000,
                ..SharedTierConfig::default()
            },
            ..Self::default()
        }
    }

    /// Pick a preset for the detected environment and apply env overrides
    pub fn from_environment() -> Self {
        let environment = detect_environment();
        let config = match environment.as_str() {
            "test" => {
                info!("Loading test cache configuration");
                Self::for_test()
            }
            "development" => {
                info!("Loading development cache configuration");
                Self::for_development()
            }
            _ => {
                info!("Loading production cache configuration");
                Self::default()
            }
        };

        config.with_env_overrides()
    }

    /// Apply `TIERED_CACHE_*` environment variable overrides
    ///
    /// Unparseable values are ignored and the configured value is kept.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(namespace) = env::var(constants::env::NAMESPACE) {
            if !namespace.is_empty() {
                info!(namespace = %namespace, "Cache namespace override");
                self.namespace = namespace;
            }
        }

        if let Ok(url) = env::var(constants::env::REDIS_URL)
            .or_else(|_| env::var(constants::env::REDIS_URL_FALLBACK))
        {
            info!("Shared tier URL override");
            self.shared_tier.url = url;
        }

        if let Ok(ttl) = env::var(constants::env::DEFAULT_TTL_SECONDS) {
            if let Ok(seconds) = ttl.parse::<i64>() {
                info!(ttl_seconds = seconds, "Default TTL override");
                self.default_ttl_seconds = seconds;
            }
        }

        if let Ok(max) = env::var(constants::env::L1_MAX_SIZE) {
            if let Ok(entries) = max.parse::<usize>() {
                info!(max_entries = entries, "Hot tier capacity override");
                self.hot_tier.max_entries = entries;
            }
        }

        if let Ok(backend) = env::var(constants::env::SHARED_BACKEND) {
            info!(backend = %backend, "Shared tier backend override");
            self.shared_tier.backend = backend;
        }

        if let Ok(enabled) = env::var(constants::env::WARMING_ENABLED) {
            self.warming.enabled = enabled.parse().unwrap_or(self.warming.enabled);
            info!(enabled = self.warming.enabled, "Cache warming override");
        }

        self
    }

    /// Lifetime applied to writes without an explicit TTL
    pub fn default_expiry(&self) -> Expiry {
        Expiry::from_seconds(self.default_ttl_seconds)
    }

    /// Lifetime given to values promoted from the shared tier
    pub fn promotion_ttl(&self) -> Duration {
        Duration::from_secs(self.hot_tier.promotion_ttl_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.namespace.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "namespace",
                "",
                "namespace must not be empty",
            ));
        }

        if self.hot_tier.max_entries == 0 {
            return Err(ConfigurationError::invalid_value(
                "hot_tier.max_entries",
                "0",
                "hot tier capacity must be at least 1",
            ));
        }

        if self.hot_tier.promotion_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "hot_tier.promotion_ttl_seconds",
                "0",
                "promotion TTL must be greater than 0",
            ));
        }

        if !(self.warming.threshold > 0.0 && self.warming.threshold <= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "warming.threshold",
                self.warming.threshold.to_string(),
                "warming threshold must be in (0.0, 1.0]",
            ));
        }

        if self.shared_tier.enabled {
            match self.shared_tier.backend.as_str() {
                backends::REDIS | backends::DRAGONFLY | backends::MEMORY | backends::NOOP => {}
                other => {
                    return Err(ConfigurationError::invalid_value(
                        "shared_tier.backend",
                        other,
                        "expected one of redis, dragonfly, memory, noop",
                    ));
                }
            }

            if self.shared_tier.connection_timeout_ms == 0 {
                return Err(ConfigurationError::invalid_value(
                    "shared_tier.connection_timeout_ms",
                    "0",
                    "connection timeout must be greater than 0",
                ));
            }

            if self.shared_tier.operation_timeout_ms == 0 {
                return Err(ConfigurationError::invalid_value(
                    "shared_tier.operation_timeout_ms",
                    "0",
                    "operation timeout must be greater than 0",
                ));
            }
        }

        if self.circuit_breaker.enabled {
            self.circuit_breaker
                .to_resilience_config()
                .validate()
                .map_err(ConfigurationError::validation_error)?;
        }

        Ok(())
    }

    /// Log current configuration for debugging
    pub fn log_configuration(&self) {
        info!(
            namespace = %self.namespace,
            default_ttl_seconds = self.default_ttl_seconds,
            l1_max_entries = self.hot_tier.max_entries,
            promotion_ttl_seconds = self.hot_tier.promotion_ttl_seconds,
            shared_enabled = self.shared_tier.enabled,
            shared_backend = %self.shared_tier.backend,
            warming_enabled = self.warming.enabled,
            warming_threshold = self.warming.threshold,
            circuit_breaker_enabled = self.circuit_breaker.enabled,
            "Cache configuration"
        );
    }
}

/// Detect current environment from environment variables
pub fn detect_environment() -> String {
    env::var(constants::env::ENVIRONMENT)
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl_seconds, 3600);
        assert_eq!(config.hot_tier.max_entries, 1000);
        assert_eq!(config.promotion_ttl(), Duration::from_secs(300));
        assert_eq!(config.shared_tier.backend, "redis");
        assert!((config.warming.threshold - 0.2).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(CacheConfig::for_test().validate().is_ok());
        assert!(CacheConfig::for_development().validate().is_ok());
    }

    #[test]
    fn test_default_expiry_non_positive_never_expires() {
        let mut config = CacheConfig::for_test();
        config.default_ttl_seconds = 0;
        assert_eq!(config.default_expiry(), Expiry::Never);

        config.default_ttl_seconds = 30;
        assert_eq!(
            config.default_expiry(),
            Expiry::After(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = CacheConfig::for_test();
        config.hot_tier.max_entries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = CacheConfig::for_test();
        config.warming.threshold = 0.0;
        assert!(config.validate().is_err());
        config.warming.threshold = 1.5;
        assert!(config.validate().is_err());
        config.warming.threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = CacheConfig::for_test();
        config.shared_tier.backend = "memcached".to_string();
        assert!(config.validate().is_err());

        // Disabled shared tier ignores the backend name
        config.shared_tier.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_invalid_circuit_breaker() {
        let mut config = CacheConfig::for_test();
        config.circuit_breaker.failure_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ValidationError { .. })
        ));

        config.circuit_breaker.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
namespace: stocks
hot_tier:
  max_entries: 50
"#;
        let config: CacheConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.namespace, "stocks");
        assert_eq!(config.hot_tier.max_entries, 50);
        assert_eq!(config.hot_tier.promotion_ttl_seconds, 300);
        assert_eq!(config.default_ttl_seconds, 3600);
    }

    #[test]
    fn test_circuit_breaker_settings_conversion() {
        let settings = CircuitBreakerSettings {
            enabled: true,
            failure_threshold: 4,
            timeout_seconds: 12,
            success_threshold: 1,
        };
        let cb = settings.to_resilience_config();
        assert_eq!(cb.failure_threshold, 4);
        assert_eq!(cb.timeout, Duration::from_secs(12));
        assert_eq!(cb.success_threshold, 1);
    }
}
