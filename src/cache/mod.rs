//! # Two-Tier Cache
//!
//! A bounded in-process LRU hot tier in front of an optional shared tier
//! (Redis or in-process memory). [`CacheCoordinator`] is the entry point.

pub mod codec;
pub mod coordinator;
pub mod entry;
pub mod hot_tier;
pub mod key;
pub mod memoize;
pub mod metrics;
pub mod providers;
pub mod shared_tier;
pub mod tasks;
pub mod traits;
pub mod warming;

pub use coordinator::{CacheCoordinator, ClearOutcome, SetOptions, WriteStrategy};
pub use entry::{CacheEntry, CacheTier, Expiry};
pub use hot_tier::{EvictionReport, HotTier};
pub use key::KeyNamespace;
pub use memoize::{function_cache_key, memoize};
pub use metrics::{CacheInfo, CacheMetrics, EffectiveConfig, EntryInfo};
pub use shared_tier::SharedTier;
pub use tasks::ShutdownReport;
pub use traits::{SharedCacheService, SharedValue};
pub use warming::{CacheWarmer, FnWarmer};
