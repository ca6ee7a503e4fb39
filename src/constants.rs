//! # Cache Constants
//!
//! Defaults and fixed values that define the operational boundaries of the
//! two-tier cache. Configuration presets in [`crate::config`] start from these.

/// Default key namespace
pub const DEFAULT_NAMESPACE: &str = "tiered_cache";

/// Default entry lifetime in seconds (one hour)
pub const DEFAULT_TTL_SECONDS: i64 = 3600;

/// Default hot tier capacity
pub const DEFAULT_HOT_TIER_MAX_ENTRIES: usize = 1000;

/// Divisor applied to the default TTL to derive the promotion TTL
pub const PROMOTION_TTL_DIVISOR: i64 = 12;

/// Default lifetime of a value promoted from the shared tier into the hot tier
pub const DEFAULT_PROMOTION_TTL_SECONDS: u64 = (DEFAULT_TTL_SECONDS / PROMOTION_TTL_DIVISOR) as u64;

/// Fraction of the hot tier evicted in one batch when it is full
pub const EVICTION_BATCH_DIVISOR: usize = 10;

/// Warming fires when this fraction (or less) of an entry's TTL remains
pub const DEFAULT_WARMING_THRESHOLD: f64 = 0.2;

/// Default shared tier URL
pub const DEFAULT_SHARED_TIER_URL: &str = "redis://localhost:6379";

/// Default shared tier connect timeout
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Default per-operation shared tier timeout
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5000;

/// Default wait for background work on shutdown
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;

/// Keys scanned per `SCAN` round trip during pattern deletes
pub const SCAN_BATCH_SIZE: usize = 100;

/// Key prefix used by the memoization helper
pub const MEMOIZE_KEY_PREFIX: &str = "func";

/// Number of hex characters of the argument digest kept in memoization keys
pub const MEMOIZE_DIGEST_LEN: usize = 8;

/// Shared tier backend names accepted in configuration
pub mod backends {
    pub const REDIS: &str = "redis";
    /// Same wire protocol as Redis
    pub const DRAGONFLY: &str = "dragonfly";
    pub const MEMORY: &str = "memory";
    pub const NOOP: &str = "noop";
}

/// Environment variable names
pub mod env {
    pub const ENVIRONMENT: &str = "TIERED_CACHE_ENV";
    pub const LOG_FORMAT: &str = "TIERED_CACHE_LOG_FORMAT";
    pub const NAMESPACE: &str = "TIERED_CACHE_NAMESPACE";
    pub const REDIS_URL: &str = "TIERED_CACHE_REDIS_URL";
    pub const REDIS_URL_FALLBACK: &str = "REDIS_URL";
    pub const DEFAULT_TTL_SECONDS: &str = "TIERED_CACHE_DEFAULT_TTL_SECONDS";
    pub const L1_MAX_SIZE: &str = "TIERED_CACHE_L1_MAX_SIZE";
    pub const SHARED_BACKEND: &str = "TIERED_CACHE_SHARED_BACKEND";
    pub const WARMING_ENABLED: &str = "TIERED_CACHE_WARMING_ENABLED";
}
