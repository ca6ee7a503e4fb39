//! # Resilience Module
//!
//! Fault isolation for the shared cache tier. A tripped breaker turns shared
//! tier reads into misses and writes into no-ops without paying a network
//! timeout on every call.
//!
//! ## Usage
//!
//! ```rust
//! use tiered_cache::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new("shared_tier", CircuitBreakerConfig::for_shared_tier());
//!
//! if breaker.should_allow() {
//!     // ... protected call ...
//!     breaker.record_success(Duration::from_millis(2));
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::CircuitBreakerMetrics;
