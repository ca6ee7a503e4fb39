//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single circuit breaker. The YAML-facing
//! settings live in [`crate::config::CircuitBreakerSettings`] and convert
//! into this type.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before attempting recovery
    pub timeout: Duration,

    /// Number of successful calls in half-open state to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_shared_tier()
    }
}

impl CircuitBreakerConfig {
    /// Configuration suited to a remote cache backend
    pub fn for_shared_tier() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.timeout > Duration::from_secs(300) {
            return Err("timeout should not exceed 300 seconds".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.success_threshold > 50 {
            return Err("success_threshold should not exceed 50".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_thresholds() {
        let mut config = CircuitBreakerConfig::for_shared_tier();
        config.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = CircuitBreakerConfig::for_shared_tier();
        config.success_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_timeout() {
        let mut config = CircuitBreakerConfig::for_shared_tier();
        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config.timeout = Duration::from_secs(301);
        assert!(config.validate().is_err());
    }
}
