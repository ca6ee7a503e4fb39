#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tiered Cache
//!
//! Two-tier cache for async Rust services: a bounded in-process LRU hot tier
//! in front of a shared tier (Redis, or an in-process memory store).
//!
//! ## Overview
//!
//! Reads check the hot tier first, then the shared tier; shared tier hits are
//! promoted into the hot tier with a short lifetime. Writes follow one of
//! three strategies (write-through, write-back, write-around). When the
//! shared tier is unreachable the cache keeps serving from the hot tier and
//! reports the degradation through its metrics instead of failing callers.
//!
//! ## Module Organization
//!
//! - [`cache`] - Coordinator, tiers, providers, warming and memoization
//! - [`config`] - YAML + environment configuration
//! - [`resilience`] - Circuit breaker guarding the shared tier
//! - [`logging`] - Structured logging setup
//! - [`error`] - Cache error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tiered_cache::{CacheConfig, CacheCoordinator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! tiered_cache::logging::init_structured_logging();
//!
//! let cache = CacheCoordinator::connect(CacheConfig::from_environment()).await?;
//! cache.set("test_key", json!({"hello": "world"})).await;
//!
//! let value = cache.get_or("test_key", json!(null)).await;
//! println!("{value} (hit rate {}%)", cache.get_metrics().hit_rate_percent);
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod resilience;

pub use cache::{
    function_cache_key, memoize, CacheCoordinator, CacheEntry, CacheInfo, CacheMetrics, CacheTier,
    CacheWarmer, ClearOutcome, Expiry, FnWarmer, SetOptions, ShutdownReport, WriteStrategy,
};
pub use config::{CacheConfig, ConfigManager, ConfigResult, ConfigurationError};
pub use error::{CacheError, CacheResult};
