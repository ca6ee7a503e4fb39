//! Cache metrics and diagnostics snapshots.

use super::entry::{CacheEntry, CacheTier};
use crate::resilience::{CircuitBreakerMetrics, CircuitState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated on the request path
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub(crate) l1_hits: AtomicU64,
    pub(crate) l2_hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) total_requests: AtomicU64,
    pub(crate) promotions: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) expirations: AtomicU64,
    pub(crate) cache_warming_jobs: AtomicU64,
    pub(crate) warming_refreshes: AtomicU64,
}

impl CacheCounters {
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Percentage of requests served by either tier, rounded to 2 decimals
pub fn hit_rate_percent(hits: u64, total_requests: u64) -> f64 {
    if total_requests == 0 {
        return 0.0;
    }
    let rate = hits as f64 / total_requests as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Point-in-time metrics for a coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate_percent: f64,
    pub evictions: u64,
    /// Expired hot tier entries purged to make room
    pub expirations: u64,
    /// Shared tier hits copied into the hot tier
    pub promotions: u64,
    pub cache_warming_jobs: u64,
    pub warming_refreshes: u64,
    pub shared_tier_failures: u64,
    pub l1_size: usize,
    pub l1_max_size: usize,
    pub redis_connected: bool,
    pub shared_backend: String,
    pub circuit_state: Option<CircuitState>,
    pub circuit_breaker: Option<CircuitBreakerMetrics>,
    pub warming_enabled: bool,
    pub background_tasks_in_flight: usize,
    pub timestamp: DateTime<Utc>,
}

/// Diagnostics for one hot tier entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub tier: CacheTier,
    pub timestamp: DateTime<Utc>,
    /// Seconds, `0` for entries that never expire
    pub ttl: i64,
    pub remaining_ttl_seconds: Option<f64>,
    pub hit_count: u64,
    pub last_accessed: DateTime<Utc>,
    /// Seconds since the last read or write
    pub idle_seconds: f64,
    pub is_expired: bool,
}

impl From<&CacheEntry> for EntryInfo {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            tier: entry.tier,
            timestamp: entry.created_at(),
            ttl: entry.expiry.as_seconds(),
            remaining_ttl_seconds: entry.remaining_ttl().map(|d| d.as_secs_f64()),
            hit_count: entry.hit_count,
            last_accessed: entry.last_accessed_at(),
            idle_seconds: entry.idle_time().as_secs_f64(),
            is_expired: entry.is_expired(),
        }
    }
}

/// Effective configuration reported alongside diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub namespace: String,
    pub l1_max_size: usize,
    pub default_ttl: i64,
    pub promotion_ttl: u64,
    pub warming_threshold: f64,
    pub shared_backend: String,
    /// Whether other processes see the shared tier's writes
    pub shared_distributed: bool,
}

/// Hot tier contents, metrics and configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    /// Most recently used first
    pub l1_cache: Vec<EntryInfo>,
    pub metrics: CacheMetrics,
    pub config: EffectiveConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_rounding() {
        assert_eq!(hit_rate_percent(0, 0), 0.0);
        assert_eq!(hit_rate_percent(3, 5), 60.0);
        assert_eq!(hit_rate_percent(1, 3), 33.33);
        assert_eq!(hit_rate_percent(2, 3), 66.67);
        assert_eq!(hit_rate_percent(7, 7), 100.0);
    }

    #[test]
    fn test_counters() {
        let counters = CacheCounters::default();
        CacheCounters::incr(&counters.l1_hits);
        CacheCounters::add(&counters.evictions, 3);
        CacheCounters::add(&counters.evictions, 0);
        assert_eq!(CacheCounters::load(&counters.l1_hits), 1);
        assert_eq!(CacheCounters::load(&counters.evictions), 3);
    }
}
