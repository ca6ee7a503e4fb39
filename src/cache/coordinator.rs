//! # Cache Coordinator
//!
//! Public entry point of the two-tier cache. Reads check the hot tier, then
//! the shared tier (promoting hits back into the hot tier). Writes follow a
//! [`WriteStrategy`]. Shared tier failures never reach the caller; they
//! show up in [`CacheMetrics`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tiered_cache::cache::CacheCoordinator;
//! use tiered_cache::config::CacheConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheCoordinator::connect(CacheConfig::from_environment()).await?;
//! cache.set("stock:SAP.DE", json!({"price": 123.45})).await;
//! assert!(cache.get("stock:SAP.DE").await.is_some());
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

use super::codec;
use super::entry::{CacheEntry, CacheTier, Expiry};
use super::hot_tier::{EvictionReport, HotTier};
use super::key::KeyNamespace;
use super::metrics::{
    hit_rate_percent, CacheCounters, CacheInfo, CacheMetrics, EffectiveConfig, EntryInfo,
};
use super::shared_tier::SharedTier;
use super::tasks::{BackgroundTasks, ShutdownReport};
use super::warming::{needs_warming, refresh_with, CacheWarmer, WarmingRegistry};
use crate::config::{CacheConfig, ConfigResult};
use crate::error::CacheResult;
use crate::logging::{log_cache_operation, log_error};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a `set` writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteStrategy {
    /// Both tiers; the call waits for both attempts
    #[default]
    WriteThrough,
    /// Hot tier now, shared tier in a background task
    WriteBack,
    /// Shared tier only; any hot tier copy is invalidated
    WriteAround,
}

/// Per-write options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Lifetime; the configured default when `None`
    pub ttl: Option<Expiry>,
    pub strategy: WriteStrategy,
}

impl SetOptions {
    pub fn ttl_seconds(seconds: i64) -> Self {
        Self::default().with_ttl(Expiry::from_seconds(seconds))
    }

    pub fn strategy(strategy: WriteStrategy) -> Self {
        Self::default().with_strategy(strategy)
    }

    pub fn with_ttl(mut self, ttl: Expiry) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_strategy(mut self, strategy: WriteStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Entries removed by a `clear`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    pub hot_removed: usize,
    pub shared_removed: u64,
}

struct CoordinatorInner {
    config: CacheConfig,
    keys: KeyNamespace,
    hot: HotTier,
    shared: SharedTier,
    counters: CacheCounters,
    tasks: BackgroundTasks,
    warming: WarmingRegistry,
}

/// Two-tier cache coordinator
///
/// Cheap to clone; clones share both tiers, the metrics and the background
/// task registry.
#[derive(Clone)]
pub struct CacheCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("namespace", &self.inner.keys.namespace())
            .field("hot_tier_size", &self.inner.hot.size())
            .field("shared_tier", &self.inner.shared)
            .finish()
    }
}

impl CacheCoordinator {
    /// Validate `config` and connect the shared tier
    ///
    /// An unreachable shared tier does not fail construction; the coordinator
    /// then runs hot-tier-only.
    pub async fn connect(config: CacheConfig) -> ConfigResult<Self> {
        config.validate()?;
        let shared = SharedTier::connect(&config).await;
        Ok(Self::build(config, shared))
    }

    /// Build a coordinator around an existing shared tier
    pub fn with_shared_tier(config: CacheConfig, shared: SharedTier) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self::build(config, shared))
    }

    fn build(config: CacheConfig, shared: SharedTier) -> Self {
        if !shared.is_enabled() {
            warn!(
                namespace = %config.namespace,
                "Shared tier unavailable, running hot-tier-only"
            );
        } else if !shared.is_distributed() {
            info!(
                namespace = %config.namespace,
                backend = shared.provider_name(),
                "Shared tier is process-local"
            );
        }
        log_cache_operation(
            "connect",
            &config.namespace,
            Some(shared.provider_name()),
            "ready",
            None,
            None,
        );
        config.log_configuration();

        Self {
            inner: Arc::new(CoordinatorInner {
                keys: KeyNamespace::new(config.namespace.clone()),
                hot: HotTier::new(config.hot_tier.max_entries),
                shared,
                counters: CacheCounters::default(),
                tasks: BackgroundTasks::new(),
                warming: WarmingRegistry::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn namespace(&self) -> &str {
        self.inner.keys.namespace()
    }

    pub fn shared_tier(&self) -> &SharedTier {
        &self.inner.shared
    }

    /// Register a warmer for logical keys starting with `prefix`
    pub fn register_warmer(&self, prefix: impl Into<String>, warmer: Arc<dyn CacheWarmer>) {
        let prefix = prefix.into();
        info!(prefix = %prefix, "Cache warmer registered");
        self.inner.warming.register(prefix, warmer);
    }

    pub fn unregister_warmer(&self, prefix: &str) -> bool {
        self.inner.warming.unregister(prefix)
    }

    /// Value for `key` from the hot tier or, failing that, the shared tier
    pub async fn get(&self, key: &str) -> Option<Value> {
        let inner = &self.inner;
        CacheCounters::incr(&inner.counters.total_requests);
        let full_key = inner.keys.key(key);

        if let Some(entry) = inner.hot.get(&full_key) {
            CacheCounters::incr(&inner.counters.l1_hits);
            debug!(key = key, hit_count = entry.hit_count, "Hot tier HIT");
            self.maybe_schedule_warming(key, &entry);
            return Some(entry.data);
        }

        if let Some(shared) = inner.shared.get(&full_key).await {
            let value = codec::decode(&shared.payload);
            let promotion_ttl = match shared.remaining_ttl {
                Some(remaining) => remaining.min(inner.config.promotion_ttl()),
                None => inner.config.promotion_ttl(),
            };

            match inner
                .hot
                .promote(&full_key, value.clone(), Expiry::After(promotion_ttl))
            {
                Some(report) => {
                    self.record_eviction(report);
                    CacheCounters::incr(&inner.counters.promotions);
                }
                None => debug!(key = key, "Fresher hot tier entry kept, promotion skipped"),
            }

            CacheCounters::incr(&inner.counters.l2_hits);
            debug!(
                key = key,
                promotion_ttl_ms = promotion_ttl.as_millis() as u64,
                "Shared tier HIT"
            );
            return Some(value);
        }

        CacheCounters::incr(&inner.counters.misses);
        debug!(key = key, "Cache MISS");
        None
    }

    /// Value for `key`, or `default` when neither tier has it
    pub async fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).await.unwrap_or(default)
    }

    /// Deserialize the cached value for `key` into `T`
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Write-through with the default TTL
    pub async fn set(&self, key: &str, value: Value) {
        self.set_with(key, value, SetOptions::default()).await;
    }

    pub async fn set_with(&self, key: &str, value: Value, options: SetOptions) {
        let inner = &self.inner;
        let full_key = inner.keys.key(key);
        let expiry = options
            .ttl
            .unwrap_or_else(|| inner.config.default_expiry());

        match options.strategy {
            WriteStrategy::WriteThrough => {
                let payload = codec::encode(&value);
                self.write_hot(&full_key, value, expiry);
                inner.shared.set(&full_key, &payload, expiry).await;
            }
            WriteStrategy::WriteBack => {
                let payload = codec::encode(&value);
                self.write_hot(&full_key, value, expiry);
                self.write_shared_in_background(full_key, payload, expiry)
                    .await;
            }
            WriteStrategy::WriteAround => {
                let payload = codec::encode(&value);
                inner.hot.delete(&full_key);
                if !inner.shared.set(&full_key, &payload, expiry).await {
                    debug!(key = key, "Shared tier rejected write-around, kept in hot tier");
                    self.write_hot(&full_key, value, expiry);
                }
            }
        }

        debug!(key = key, strategy = ?options.strategy, ttl_seconds = expiry.as_seconds(), "Cache SET");
    }

    /// Serialize `value` and store it
    pub async fn set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.set_with(key, value, options).await;
        Ok(())
    }

    /// Remove `key` from both tiers; absent keys also succeed
    pub async fn delete(&self, key: &str) -> bool {
        let full_key = self.inner.keys.key(key);
        self.inner.hot.delete(&full_key);
        self.inner.shared.delete(&full_key).await;
        debug!(key = key, "Cache DEL");
        true
    }

    /// Remove every key starting with `pattern` (trailing `*` optional) from
    /// both tiers; no pattern clears the whole namespace
    pub async fn clear(&self, pattern: Option<&str>) -> ClearOutcome {
        let prefix = self.inner.keys.pattern_prefix(pattern);
        // Every hot tier key lives under this coordinator's namespace
        let hot_removed = match pattern {
            None => self.inner.hot.clear(),
            Some(_) => self.inner.hot.remove_prefix(&prefix),
        };
        let outcome = ClearOutcome {
            hot_removed,
            shared_removed: self.inner.shared.delete_prefix(&prefix).await,
        };
        log_cache_operation(
            "clear",
            &prefix,
            None,
            "ok",
            None,
            Some(&format!(
                "hot_removed={} shared_removed={}",
                outcome.hot_removed, outcome.shared_removed
            )),
        );
        outcome
    }

    /// Probe the shared tier
    pub async fn health_check(&self) -> bool {
        self.inner.shared.health_check().await
    }

    pub fn get_metrics(&self) -> CacheMetrics {
        let inner = &self.inner;
        let counters = &inner.counters;
        let l1_hits = CacheCounters::load(&counters.l1_hits);
        let l2_hits = CacheCounters::load(&counters.l2_hits);
        let total_requests = CacheCounters::load(&counters.total_requests);

        CacheMetrics {
            l1_hits,
            l2_hits,
            misses: CacheCounters::load(&counters.misses),
            total_requests,
            hit_rate_percent: hit_rate_percent(l1_hits + l2_hits, total_requests),
            evictions: CacheCounters::load(&counters.evictions),
            expirations: CacheCounters::load(&counters.expirations),
            promotions: CacheCounters::load(&counters.promotions),
            cache_warming_jobs: CacheCounters::load(&counters.cache_warming_jobs),
            warming_refreshes: CacheCounters::load(&counters.warming_refreshes),
            shared_tier_failures: inner.shared.failure_count(),
            l1_size: inner.hot.size(),
            l1_max_size: inner.hot.capacity(),
            redis_connected: inner.shared.is_connected(),
            shared_backend: inner.shared.provider_name().to_string(),
            circuit_state: inner.shared.circuit_state(),
            circuit_breaker: inner.shared.circuit_metrics(),
            warming_enabled: inner.config.warming.enabled,
            background_tasks_in_flight: inner.tasks.in_flight(),
            timestamp: Utc::now(),
        }
    }

    pub fn get_cache_info(&self) -> CacheInfo {
        let config = &self.inner.config;
        CacheInfo {
            l1_cache: self
                .inner
                .hot
                .snapshot()
                .iter()
                .map(EntryInfo::from)
                .collect(),
            metrics: self.get_metrics(),
            config: EffectiveConfig {
                namespace: config.namespace.clone(),
                l1_max_size: config.hot_tier.max_entries,
                default_ttl: config.default_ttl_seconds,
                promotion_ttl: config.hot_tier.promotion_ttl_seconds,
                warming_threshold: config.warming.threshold,
                shared_backend: self.inner.shared.provider_name().to_string(),
                shared_distributed: self.inner.shared.is_distributed(),
            },
        }
    }

    /// Wait for pending write-back writes and warming refreshes
    pub async fn flush_background(&self) {
        self.inner.tasks.flush().await;
    }

    /// Stop accepting background work and drain it within the configured
    /// grace period
    ///
    /// The coordinator stays usable afterwards: write-back writes run inline
    /// and warming is skipped.
    pub async fn shutdown(&self) -> ShutdownReport {
        let report = self
            .inner
            .tasks
            .shutdown(self.inner.config.shutdown_grace())
            .await;
        log_cache_operation(
            "shutdown",
            self.namespace(),
            None,
            "ok",
            None,
            Some(&format!(
                "completed={} aborted={}",
                report.completed, report.aborted
            )),
        );
        report
    }

    fn write_hot(&self, full_key: &str, value: Value, expiry: Expiry) {
        let report = self.inner.hot.set(full_key, value, expiry, CacheTier::Hot);
        self.record_eviction(report);
    }

    async fn write_shared_in_background(&self, full_key: String, payload: String, expiry: Expiry) {
        if self.inner.tasks.is_accepting() && self.inner.shared.is_enabled() {
            let shared = self.inner.shared.clone();
            let (key, body) = (full_key.clone(), payload.clone());
            if self.inner.tasks.spawn(async move {
                shared.set(&key, &body, expiry).await;
            }) {
                return;
            }
        }
        self.inner.shared.set(&full_key, &payload, expiry).await;
    }

    fn record_eviction(&self, report: EvictionReport) {
        CacheCounters::add(&self.inner.counters.evictions, report.evicted);
        CacheCounters::add(&self.inner.counters.expirations, report.expired);
    }

    fn maybe_schedule_warming(&self, key: &str, entry: &CacheEntry) {
        let inner = &self.inner;
        if !inner.config.warming.enabled {
            return;
        }
        let (Some(total), Some(remaining)) = (entry.expiry.as_duration(), entry.remaining_ttl())
        else {
            return;
        };
        if !needs_warming(remaining, total, inner.config.warming.threshold) {
            return;
        }

        CacheCounters::incr(&inner.counters.cache_warming_jobs);

        let Some(warmer) = inner.warming.find(key) else {
            debug!(key = key, "Entry near expiry, no warmer registered");
            return;
        };
        if !inner.tasks.is_accepting() {
            return;
        }
        let Some(guard) = inner.warming.begin(key) else {
            debug!(key = key, "Warming already in flight");
            return;
        };

        let this = self.clone();
        let key = key.to_string();
        // A promoted copy carries the short hot-tier TTL, not the shared one
        let expiry = match entry.tier {
            CacheTier::Shared => inner.config.default_expiry(),
            CacheTier::Hot => entry.expiry,
        };
        let spawned = inner.tasks.spawn(async move {
            let _guard = guard;
            match refresh_with(warmer.as_ref(), &key).await {
                Ok(Some(value)) => {
                    this.set_with(&key, value, SetOptions::default().with_ttl(expiry))
                        .await;
                    CacheCounters::incr(&this.inner.counters.warming_refreshes);
                    debug!(key = %key, "Cache entry warmed");
                }
                Ok(None) => debug!(key = %key, "Warmer declined refresh"),
                Err(e) => log_error("cache_warming", "refresh", &e.to_string(), Some(&key)),
            }
        });
        if spawned {
            debug!(key = %entry.key, "Cache warming scheduled");
        }
    }
}
