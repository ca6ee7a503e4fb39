//! # Circuit Breaker Implementation
//!
//! Protects the shared cache tier from repeated timeout penalties while the
//! backend is down. Classic three-state breaker: Closed (normal operation),
//! Open (failing fast) and Half-Open (testing recovery).

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lock-free counters backing [`CircuitBreakerMetrics`] snapshots.
#[derive(Debug, Default)]
struct AtomicCircuitBreakerMetrics {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rejected_count: AtomicU64,
    consecutive_failures: AtomicU64,
    half_open_calls: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl AtomicCircuitBreakerMetrics {
    #[inline]
    fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration_nanos(duration), Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration_nanos(duration), Ordering::Relaxed);
    }

    fn snapshot(&self, state: CircuitState) -> CircuitBreakerMetrics {
        let total_calls = self.total_calls.load(Ordering::Relaxed);
        let success_count = self.success_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);
        let total_duration_nanos = self.total_duration_nanos.load(Ordering::Relaxed);

        let (failure_rate, average_duration) = if total_calls > 0 {
            (
                failure_count as f64 / total_calls as f64,
                Duration::from_nanos(total_duration_nanos / total_calls),
            )
        } else {
            (0.0, Duration::ZERO)
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            current_state: state,
            failure_rate,
            average_duration,
        }
    }
}

#[inline]
fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test backend health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Circuit breaker with atomic state management
///
/// Callers check [`CircuitBreaker::should_allow`] before a protected call and
/// report the outcome with [`CircuitBreaker::record_success`] or
/// [`CircuitBreaker::record_failure`].
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    metrics: AtomicCircuitBreakerMetrics,
    /// Monotonic reference point for `opened_at_nanos`
    created_at: Instant,
    /// Nanos since `created_at` when the circuit was opened, plus one
    /// (0 = not open)
    opened_at_nanos: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_seconds = config.timeout.as_secs(),
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            metrics: AtomicCircuitBreakerMetrics::default(),
            created_at: Instant::now(),
            opened_at_nanos: AtomicU64::new(0),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether a protected call may proceed
    ///
    /// An open circuit moves to half-open once its timeout has elapsed.
    /// Rejected calls are counted in the metrics.
    pub fn should_allow(&self) -> bool {
        let allowed = match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_nanos = self.opened_at_nanos.load(Ordering::Acquire);
                let elapsed_nanos = self.nanos_since_created().saturating_sub(opened_nanos);
                if opened_nanos == 0 || elapsed_nanos >= duration_nanos(self.config.timeout) {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                self.metrics.half_open_calls.load(Ordering::Relaxed)
                    < u64::from(self.config.success_threshold)
            }
        };

        if !allowed {
            self.metrics.rejected_count.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    /// Record a successful protected call
    pub fn record_success(&self, duration: Duration) {
        self.metrics.record_success(duration);

        match self.state() {
            CircuitState::HalfOpen => {
                let calls = self.metrics.half_open_calls.fetch_add(1, Ordering::Relaxed) + 1;
                if calls >= u64::from(self.config.success_threshold) {
                    self.transition_to_closed();
                }
            }
            CircuitState::Closed => {
                self.metrics.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {
                debug!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed protected call
    pub fn record_failure(&self, duration: Duration) {
        self.metrics.record_failure(duration);

        match self.state() {
            CircuitState::Closed => {
                let failures = self
                    .metrics
                    .consecutive_failures
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                if failures >= u64::from(self.config.failure_threshold) {
                    self.transition_to_open();
                }
            }
            // Any failure while probing reopens immediately
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Open => {}
        }
    }

    /// Force circuit to open state
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        self.transition_to_open();
    }

    /// Force circuit to closed state
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        self.transition_to_closed();
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics.snapshot(self.state())
    }

    #[inline]
    fn nanos_since_created(&self) -> u64 {
        duration_nanos(self.created_at.elapsed()).saturating_add(1)
    }

    fn transition_to_closed(&self) {
        self.metrics.consecutive_failures.store(0, Ordering::Relaxed);
        self.metrics.half_open_calls.store(0, Ordering::Relaxed);
        self.opened_at_nanos.store(0, Ordering::Release);
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);

        info!(component = %self.name, "Circuit breaker closed (recovered)");
    }

    fn transition_to_open(&self) {
        self.opened_at_nanos
            .store(self.nanos_since_created(), Ordering::Release);
        self.metrics.half_open_calls.store(0, Ordering::Relaxed);
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        warn!(
            component = %self.name,
            consecutive_failures = self.metrics.consecutive_failures.load(Ordering::Relaxed),
            failure_threshold = self.config.failure_threshold,
            timeout_seconds = self.config.timeout.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_half_open(&self) {
        self.metrics.half_open_calls.store(0, Ordering::Relaxed);
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "Circuit breaker half-open (testing recovery)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(timeout: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            timeout,
            success_threshold: 2,
        }
    }

    #[test]
    fn test_starts_closed_and_allows() {
        let cb = CircuitBreaker::new("shared_tier", config(Duration::from_secs(30)));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow());
        assert_eq!(cb.name(), "shared_tier");
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new("shared_tier", config(Duration::from_secs(30)));

        cb.record_failure(Duration::from_millis(5));
        cb.record_failure(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());

        let metrics = cb.metrics();
        assert_eq!(metrics.failure_count, 3);
        assert_eq!(metrics.rejected_count, 1);
        assert_eq!(metrics.current_state, CircuitState::Open);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new("shared_tier", config(Duration::from_secs(30)));

        cb.record_failure(Duration::ZERO);
        cb.record_failure(Duration::ZERO);
        cb.record_success(Duration::ZERO);
        cb.record_failure(Duration::ZERO);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.metrics().consecutive_failures, 1);
    }

    #[test]
    fn test_half_open_recovery_closes_circuit() {
        let cb = CircuitBreaker::new("shared_tier", config(Duration::ZERO));
        cb.force_open();

        // Zero timeout: next check moves to half-open
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("shared_tier", config(Duration::ZERO));
        cb.force_open();
        assert!(cb.should_allow());

        cb.record_failure(Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_waits_for_timeout() {
        let cb = CircuitBreaker::new("shared_tier", config(Duration::from_secs(30)));
        cb.force_open();
        assert!(!cb.should_allow());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!cb.should_allow());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.metrics().rejected_count, 2);
    }

    #[test]
    fn test_force_closed() {
        let cb = CircuitBreaker::new("shared_tier", config(Duration::from_secs(30)));
        cb.force_open();
        cb.force_closed();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.should_allow());
    }

    #[test]
    fn test_unknown_state_byte_maps_to_open() {
        assert_eq!(CircuitState::from(7), CircuitState::Open);
    }
}
