//! Shared tier with integrated circuit breaker
//!
//! Uses enum dispatch over the concrete providers. Every call carries the
//! configured operation timeout. Connection, timeout and backend errors are
//! absorbed here: they are logged, counted and fed to the circuit breaker,
//! and callers see a miss or a no-op instead. Any other error is logged at
//! error level and also turns into a miss or no-op, without counting as a
//! shared tier failure.
//!
//! While the circuit is open no network call is made: `get` is a miss and
//! writes are skipped.

use super::entry::Expiry;
use super::providers::{MemoryCacheService, NoOpCacheService};
use super::traits::{SharedCacheService, SharedValue};
use crate::config::CacheConfig;
use crate::constants::backends;
use crate::error::{CacheError, CacheResult};
use crate::logging::{log_error, redact_url};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[cfg(feature = "cache-redis")]
use super::providers::RedisCacheService;

/// Internal backend enum for zero-cost dispatch
#[derive(Debug, Clone)]
enum SharedBackend {
    #[cfg(feature = "cache-redis")]
    Redis(Box<RedisCacheService>),
    Memory(MemoryCacheService),
    NoOp(NoOpCacheService),
}

impl SharedBackend {
    fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.provider_name(),
            Self::Memory(s) => s.provider_name(),
            Self::NoOp(s) => s.provider_name(),
        }
    }

    fn is_distributed(&self) -> bool {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.is_distributed(),
            Self::Memory(s) => s.is_distributed(),
            Self::NoOp(s) => s.is_distributed(),
        }
    }

    fn is_enabled(&self) -> bool {
        !matches!(self, Self::NoOp(_))
    }

    async fn get(&self, key: &str) -> CacheResult<Option<SharedValue>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
            Self::NoOp(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, payload: &str, expiry: Expiry) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.set(key, payload, expiry).await,
            Self::Memory(s) => s.set(key, payload, expiry).await,
            Self::NoOp(s) => s.set(key, payload, expiry).await,
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.delete(key).await,
            Self::Memory(s) => s.delete(key).await,
            Self::NoOp(s) => s.delete(key).await,
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.delete_prefix(prefix).await,
            Self::Memory(s) => s.delete_prefix(prefix).await,
            Self::NoOp(s) => s.delete_prefix(prefix).await,
        }
    }

    async fn health_check(&self) -> CacheResult<bool> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.health_check().await,
            Self::Memory(s) => s.health_check().await,
            Self::NoOp(s) => s.health_check().await,
        }
    }
}

/// Shared (L2) tier adapter
///
/// Cheap to clone; clones share the backend connection, the circuit breaker
/// and the failure counter.
#[derive(Clone)]
pub struct SharedTier {
    backend: SharedBackend,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    operation_timeout: Duration,
    failures: Arc<AtomicU64>,
}

impl std::fmt::Debug for SharedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTier")
            .field("backend", &self.backend.provider_name())
            .field(
                "circuit_breaker",
                &self.circuit_breaker.as_ref().map(|cb| cb.state()),
            )
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

impl SharedTier {
    /// Build the shared tier from configuration with graceful degradation
    ///
    /// A backend that cannot be reached within the connect timeout is
    /// replaced by NoOp; startup never fails because of the shared tier.
    pub async fn connect(config: &CacheConfig) -> Self {
        let backend = Self::create_backend(config).await;
        let breaker_config = config
            .circuit_breaker
            .enabled
            .then(|| config.circuit_breaker.to_resilience_config());
        Self::from_parts(backend, config.shared_tier.operation_timeout(), breaker_config)
    }

    /// Shared tier over an in-process store
    pub fn memory(
        service: MemoryCacheService,
        operation_timeout: Duration,
        circuit_breaker: Option<CircuitBreakerConfig>,
    ) -> Self {
        Self::from_parts(
            SharedBackend::Memory(service),
            operation_timeout,
            circuit_breaker,
        )
    }

    /// Shared tier over an already connected Redis service
    #[cfg(feature = "cache-redis")]
    pub fn redis(
        service: RedisCacheService,
        operation_timeout: Duration,
        circuit_breaker: Option<CircuitBreakerConfig>,
    ) -> Self {
        Self::from_parts(
            SharedBackend::Redis(Box::new(service)),
            operation_timeout,
            circuit_breaker,
        )
    }

    /// Disabled shared tier (hot-tier-only operation)
    pub fn noop() -> Self {
        Self::from_parts(
            SharedBackend::NoOp(NoOpCacheService::new()),
            Duration::from_secs(1),
            None,
        )
    }

    fn from_parts(
        backend: SharedBackend,
        operation_timeout: Duration,
        circuit_breaker: Option<CircuitBreakerConfig>,
    ) -> Self {
        // No breaker for a backend that never does I/O
        let circuit_breaker = if backend.is_enabled() {
            circuit_breaker.map(|cb_config| {
                info!(
                    backend = backend.provider_name(),
                    failure_threshold = cb_config.failure_threshold,
                    timeout_seconds = cb_config.timeout.as_secs(),
                    "Shared tier circuit breaker initialized"
                );
                Arc::new(CircuitBreaker::new("shared_tier", cb_config))
            })
        } else {
            None
        };

        Self {
            backend,
            circuit_breaker,
            operation_timeout,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn create_backend(config: &CacheConfig) -> SharedBackend {
        if !config.shared_tier.enabled {
            info!("Shared tier disabled by configuration");
            return SharedBackend::NoOp(NoOpCacheService::new());
        }

        match config.shared_tier.backend.as_str() {
            // Dragonfly speaks the Redis protocol
            backends::REDIS | backends::DRAGONFLY => Self::create_redis_backend(config).await,
            backends::MEMORY => {
                info!(backend = "memory", "In-process shared tier initialized");
                SharedBackend::Memory(MemoryCacheService::new())
            }
            backends::NOOP => SharedBackend::NoOp(NoOpCacheService::new()),
            other => {
                warn!(backend = other, "Unknown shared tier backend, falling back to NoOp");
                SharedBackend::NoOp(NoOpCacheService::new())
            }
        }
    }

    #[cfg(feature = "cache-redis")]
    async fn create_redis_backend(config: &CacheConfig) -> SharedBackend {
        let url = &config.shared_tier.url;
        match RedisCacheService::connect(url, config.shared_tier.connection_timeout()).await {
            Ok(service) => {
                info!(
                    backend = "redis",
                    url = %redact_url(url),
                    "Shared tier connected"
                );
                SharedBackend::Redis(Box::new(service))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    url = %redact_url(url),
                    "Failed to connect to shared tier, running hot-tier-only (degraded mode)"
                );
                SharedBackend::NoOp(NoOpCacheService::new())
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn create_redis_backend(config: &CacheConfig) -> SharedBackend {
        warn!(
            url = %redact_url(&config.shared_tier.url),
            "Redis shared tier requested but 'cache-redis' feature not enabled, using NoOp"
        );
        SharedBackend::NoOp(NoOpCacheService::new())
    }

    /// Backend name (`redis`, `memory`, `noop`)
    pub fn provider_name(&self) -> &'static str {
        self.backend.provider_name()
    }

    /// True when a real backend is configured (not NoOp)
    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    pub fn is_distributed(&self) -> bool {
        self.backend.is_distributed()
    }

    /// True when a backend is configured and its circuit is not open
    pub fn is_connected(&self) -> bool {
        self.is_enabled() && self.circuit_state() != Some(CircuitState::Open)
    }

    /// Circuit breaker state, `None` when no breaker is configured
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuit_breaker.as_ref().map(|cb| cb.state())
    }

    /// Circuit breaker counters, `None` when no breaker is configured
    pub fn circuit_metrics(&self) -> Option<CircuitBreakerMetrics> {
        self.circuit_breaker.as_ref().map(|cb| cb.metrics())
    }

    /// Number of absorbed backend failures since startup
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Payload for `key`, `None` on miss or failure
    pub async fn get(&self, key: &str) -> Option<SharedValue> {
        self.guarded("get", key, None, move || self.backend.get(key))
            .await
    }

    /// Store `payload`; returns whether the backend accepted the write
    pub async fn set(&self, key: &str, payload: &str, expiry: Expiry) -> bool {
        self.guarded("set", key, false, move || async move {
            self.backend.set(key, payload, expiry).await.map(|()| true)
        })
        .await
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.guarded("delete", key, false, move || async move {
            self.backend.delete(key).await.map(|()| true)
        })
        .await
    }

    /// Delete every key starting with `prefix`; `0` on failure
    pub async fn delete_prefix(&self, prefix: &str) -> u64 {
        self.guarded("delete_prefix", prefix, 0, move || self.backend.delete_prefix(prefix))
            .await
    }

    /// Probe the backend; a disabled tier is reported unhealthy
    pub async fn health_check(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.guarded("health_check", "-", false, move || self.backend.health_check())
            .await
    }

    async fn guarded<T, F, Fut>(&self, operation: &'static str, key: &str, fallback: T, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        if !self.is_enabled() {
            return fallback;
        }

        if let Some(cb) = &self.circuit_breaker {
            if !cb.should_allow() {
                debug!(operation = operation, key = key, "Shared tier circuit open, skipping");
                return fallback;
            }
        }

        let start = Instant::now();
        let result = match tokio::time::timeout(self.operation_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(format!(
                "shared tier {operation} exceeded {}ms",
                self.operation_timeout.as_millis()
            ))),
        };
        let duration = start.elapsed();

        match result {
            Ok(value) => {
                if let Some(cb) = &self.circuit_breaker {
                    cb.record_success(duration);
                }
                value
            }
            Err(error) if error.is_backend_io() => {
                if let Some(cb) = &self.circuit_breaker {
                    cb.record_failure(duration);
                }
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    operation = operation,
                    key = key,
                    backend = self.provider_name(),
                    error = %error,
                    "Shared tier operation failed, continuing without it"
                );
                fallback
            }
            Err(error) => {
                // The backend answered; the breaker only tracks reachability
                log_error("shared_tier", operation, &error.to_string(), Some(key));
                fallback
            }
        }
    }
}
