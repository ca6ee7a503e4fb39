//! # Hot Tier
//!
//! Bounded in-process LRU tier. The key map and the access order live in a
//! single [`LruCache`] behind one mutex, so they can never disagree. The lock
//! is only taken for synchronous work and is never held across an `.await`.
//!
//! When a new key arrives at capacity, expired entries are purged first; if
//! the tier is still full, the least recently used `max(1, capacity / 10)`
//! entries are evicted in one batch.

use super::entry::{CacheEntry, CacheTier, Expiry};
use crate::constants::EVICTION_BATCH_DIVISOR;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

/// Entries removed to make room for an insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Expired entries purged
    pub expired: usize,
    /// Live entries evicted in LRU order
    pub evicted: usize,
}

#[derive(Debug)]
pub struct HotTier {
    entries: Mutex<LruCache<String, CacheEntry>>,
    capacity: usize,
}

impl HotTier {
    /// Create a hot tier holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted per batch when the tier is full
    pub fn eviction_batch(&self) -> usize {
        (self.capacity / EVICTION_BATCH_DIVISOR).max(1)
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Fresh entry for `key`, recording the access and marking it most
    /// recently used. Expired entries are left untouched and read as absent.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        if entries.peek(key).map_or(true, CacheEntry::is_expired) {
            return None;
        }
        let entry = entries.get_mut(key)?;
        entry.record_access();
        Some(entry.clone())
    }

    /// Entry for `key` without recording an access or touching LRU order
    #[cfg(test)]
    fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().peek(key).cloned()
    }

    /// Insert or overwrite `key` as the most recently used entry
    pub fn set(&self, key: &str, value: Value, expiry: Expiry, tier: CacheTier) -> EvictionReport {
        let mut entries = self.entries.lock();
        let report = self.make_room(&mut entries, key);
        entries.put(key.to_string(), CacheEntry::new(key, value, expiry, tier));
        report
    }

    /// Insert a value promoted from the shared tier
    ///
    /// Returns `None` without writing when a fresh entry for `key` already
    /// exists, so a newer local write is never replaced by an older shared copy.
    pub fn promote(&self, key: &str, value: Value, expiry: Expiry) -> Option<EvictionReport> {
        let mut entries = self.entries.lock();
        if entries.peek(key).is_some_and(|entry| !entry.is_expired()) {
            return None;
        }
        let report = self.make_room(&mut entries, key);
        entries.put(
            key.to_string(),
            CacheEntry::new(key, value, expiry, CacheTier::Shared),
        );
        Some(report)
    }

    /// Remove `key`, returning whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    /// Drop every entry, returning how many were held
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Copy of every entry, most recently used first
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.entries
            .lock()
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    fn make_room(&self, entries: &mut LruCache<String, CacheEntry>, key: &str) -> EvictionReport {
        let mut report = EvictionReport::default();
        if entries.contains(key) || entries.len() < self.capacity {
            return report;
        }

        report.expired = Self::purge_expired_locked(entries);
        if entries.len() >= self.capacity {
            for _ in 0..self.eviction_batch() {
                match entries.pop_lru() {
                    Some((evicted_key, _)) => {
                        debug!(key = %evicted_key, "Hot tier LRU eviction");
                        report.evicted += 1;
                    }
                    None => break,
                }
            }
        }
        report
    }

    fn purge_expired_locked(entries: &mut LruCache<String, CacheEntry>) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn ttl(seconds: i64) -> Expiry {
        Expiry::from_seconds(seconds)
    }

    #[test]
    fn test_get_records_access() {
        let tier = HotTier::new(10);
        tier.set("a", json!(1), ttl(60), CacheTier::Hot);

        assert_eq!(tier.get("a").unwrap().hit_count, 1);
        assert_eq!(tier.get("a").unwrap().hit_count, 2);
        assert_eq!(tier.peek("a").unwrap().hit_count, 2);
        assert!(tier.get("missing").is_none());
    }

    #[test]
    fn test_eviction_batch_sizes() {
        assert_eq!(HotTier::new(0).eviction_batch(), 1);
        assert_eq!(HotTier::new(9).eviction_batch(), 1);
        assert_eq!(HotTier::new(10).eviction_batch(), 1);
        assert_eq!(HotTier::new(1000).eviction_batch(), 100);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let tier = HotTier::new(10);
        for i in 0..10 {
            tier.set(&format!("k{i}"), json!(i), ttl(60), CacheTier::Hot);
        }
        let report = tier.set("k10", json!(10), ttl(60), CacheTier::Hot);

        assert_eq!(report, EvictionReport { expired: 0, evicted: 1 });
        assert!(tier.peek("k0").is_none());
        assert!(tier.peek("k10").is_some());
        assert_eq!(tier.size(), 10);
    }

    #[test]
    fn test_batch_eviction_removes_ten_percent() {
        let tier = HotTier::new(100);
        for i in 0..100 {
            tier.set(&format!("k{i}"), json!(i), ttl(60), CacheTier::Hot);
        }
        let report = tier.set("new", json!(0), ttl(60), CacheTier::Hot);

        assert_eq!(report.evicted, 10);
        assert_eq!(tier.size(), 91);
        assert!(tier.peek("k9").is_none());
        assert!(tier.peek("k10").is_some());
    }

    #[test]
    fn test_recent_read_survives_eviction() {
        let tier = HotTier::new(10);
        for i in 0..10 {
            tier.set(&format!("k{i}"), json!(i), ttl(60), CacheTier::Hot);
        }
        tier.get("k0");
        tier.set("k10", json!(10), ttl(60), CacheTier::Hot);

        assert!(tier.peek("k0").is_some());
        assert!(tier.peek("k1").is_none());
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let tier = HotTier::new(3);
        for key in ["a", "b", "c"] {
            tier.set(key, json!(key), ttl(60), CacheTier::Hot);
        }
        let report = tier.set("a", json!("again"), ttl(60), CacheTier::Hot);

        assert_eq!(report, EvictionReport::default());
        assert_eq!(tier.size(), 3);
        assert_eq!(tier.peek("a").unwrap().data, json!("again"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_purged_before_eviction() {
        let tier = HotTier::new(3);
        tier.set("short", json!(1), ttl(1), CacheTier::Hot);
        tier.set("b", json!(2), ttl(60), CacheTier::Hot);
        tier.set("c", json!(3), ttl(60), CacheTier::Hot);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(tier.get("short").is_none());

        let report = tier.set("d", json!(4), ttl(60), CacheTier::Hot);
        assert_eq!(report, EvictionReport { expired: 1, evicted: 0 });
        assert!(tier.peek("b").is_some());
        assert!(tier.peek("d").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_promote_respects_fresh_entry() {
        let tier = HotTier::new(10);
        tier.set("k", json!("local"), ttl(60), CacheTier::Hot);
        assert!(tier.promote("k", json!("remote"), ttl(5)).is_none());
        assert_eq!(tier.peek("k").unwrap().data, json!("local"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(tier.promote("k", json!("remote"), ttl(5)).is_some());
        let entry = tier.peek("k").unwrap();
        assert_eq!(entry.data, json!("remote"));
        assert_eq!(entry.tier, CacheTier::Shared);
    }

    #[test]
    fn test_remove_prefix_delete_and_clear() {
        let tier = HotTier::new(10);
        tier.set("ns:quote:a", json!(1), ttl(60), CacheTier::Hot);
        tier.set("ns:quote:b", json!(2), ttl(60), CacheTier::Hot);
        tier.set("ns:news:a", json!(3), ttl(60), CacheTier::Hot);

        assert_eq!(tier.remove_prefix("ns:quote:"), 2);
        assert_eq!(tier.size(), 1);
        assert!(tier.delete("ns:news:a"));
        assert!(!tier.delete("ns:news:a"));
        assert_eq!(tier.size(), 0);

        tier.set("x", json!(0), ttl(60), CacheTier::Hot);
        tier.set("y", json!(0), ttl(60), CacheTier::Hot);
        assert_eq!(tier.clear(), 2);
        assert_eq!(tier.size(), 0);
    }

    #[test]
    fn test_snapshot_is_mru_first() {
        let tier = HotTier::new(10);
        tier.set("a", json!(1), ttl(60), CacheTier::Hot);
        tier.set("b", json!(2), ttl(60), CacheTier::Hot);
        tier.get("a");

        let keys: Vec<String> = tier.snapshot().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_capacity(
            capacity in 1usize..40,
            keys in proptest::collection::vec(0u16..200, 1..300),
        ) {
            let tier = HotTier::new(capacity);
            for key in &keys {
                tier.set(&key.to_string(), json!(key), Expiry::Never, CacheTier::Hot);
                prop_assert!(tier.size() <= capacity);
            }
        }

        #[test]
        fn prop_latest_write_is_readable(
            capacity in 1usize..40,
            keys in proptest::collection::vec(0u16..200, 1..300),
        ) {
            let tier = HotTier::new(capacity);
            for key in &keys {
                let key = key.to_string();
                tier.set(&key, json!(key), Expiry::Never, CacheTier::Hot);
                let entry = tier.get(&key);
                prop_assert!(entry.is_some());
                prop_assert_eq!(entry.unwrap().data, json!(key));
            }
        }
    }
}
