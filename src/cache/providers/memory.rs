//! In-process shared tier provider
//!
//! Same contract as the Redis provider (per-key server-side expiry, prefix
//! deletes, remaining TTL on reads) without a network hop. Clones share one
//! store, so several coordinators in a process see the same data, which is
//! how single-process deployments and tests exercise the shared tier.
//!
//! **Important**: this store is NOT distributed across processes.

use crate::cache::entry::Expiry;
use crate::cache::traits::{SharedCacheService, SharedValue};
use crate::error::{CacheError, CacheResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredValue {
    payload: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// DashMap-backed shared tier with per-entry expiry
#[derive(Debug, Clone)]
pub struct MemoryCacheService {
    store: Arc<DashMap<String, StoredValue>>,
    available: Arc<AtomicBool>,
    latency_micros: Arc<AtomicU64>,
}

impl Default for MemoryCacheService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheService {
    pub fn new() -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
            latency_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate an outage: while unavailable every call fails with
    /// [`CacheError::ConnectionError`]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Delay every call by `latency`, like a network round trip
    pub fn set_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_micros.store(micros, Ordering::Release);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_micros.load(Ordering::Acquire))
    }

    /// Number of stored keys, expired ones included until next touched
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    async fn ensure_available(&self) -> CacheResult<()> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(CacheError::ConnectionError(
                "in-memory shared tier unavailable".to_string(),
            ))
        }
    }
}

impl SharedCacheService for MemoryCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<SharedValue>> {
        self.ensure_available().await?;
        let now = Instant::now();

        let stored = self.store.get(key).map(|entry| entry.value().clone());
        match stored {
            Some(stored) if stored.is_expired(now) => {
                self.store.remove_if(key, |_, current| current.is_expired(now));
                debug!(key = key, "Cache MISS (memory, expired)");
                Ok(None)
            }
            Some(stored) => {
                debug!(key = key, "Cache HIT (memory)");
                Ok(Some(SharedValue {
                    payload: stored.payload,
                    remaining_ttl: stored
                        .expires_at
                        .map(|at| at.saturating_duration_since(now)),
                }))
            }
            None => {
                debug!(key = key, "Cache MISS (memory)");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, payload: &str, expiry: Expiry) -> CacheResult<()> {
        self.ensure_available().await?;
        let expires_at = expiry
            .as_duration()
            .and_then(|ttl| Instant::now().checked_add(ttl));
        self.store.insert(
            key.to_string(),
            StoredValue {
                payload: payload.to_string(),
                expires_at,
            },
        );
        debug!(key = key, ttl_seconds = expiry.as_seconds(), "Cache SET (memory)");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.ensure_available().await?;
        self.store.remove(key);
        debug!(key = key, "Cache DEL (memory)");
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        self.ensure_available().await?;
        let mut deleted: u64 = 0;
        self.store.retain(|key, _| {
            let matches = key.starts_with(prefix);
            if matches {
                deleted += 1;
            }
            !matches
        });
        debug!(prefix = prefix, deleted = deleted, "Cache prefix DEL (memory)");
        Ok(deleted)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(self.ensure_available().await.is_ok())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_crud_operations() {
        let svc = MemoryCacheService::new();
        svc.set("ns:key", r#"{"a":1}"#, Expiry::from_seconds(60))
            .await
            .unwrap();

        let hit = svc.get("ns:key").await.unwrap().unwrap();
        assert_eq!(hit.payload, r#"{"a":1}"#);
        assert!(hit.remaining_ttl.is_some());

        svc.delete("ns:key").await.unwrap();
        assert_eq!(svc.get("ns:key").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_ttl_expiry() {
        let svc = MemoryCacheService::new();
        svc.set("k", "temporary", Expiry::from_seconds(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(400)).await;
        let hit = svc.get("k").await.unwrap().unwrap();
        assert_eq!(hit.remaining_ttl, Some(Duration::from_millis(600)));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(svc.get("k").await.unwrap(), None);
        assert!(svc.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_never_expires() {
        let svc = MemoryCacheService::new();
        svc.set("k", "forever", Expiry::Never).await.unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;

        let hit = svc.get("k").await.unwrap().unwrap();
        assert_eq!(hit.remaining_ttl, None);
    }

    #[tokio::test]
    async fn test_memory_prefix_delete() {
        let svc = MemoryCacheService::new();
        for i in 0..5 {
            svc.set(&format!("ns:quote:{i}"), "v", Expiry::Never)
                .await
                .unwrap();
        }
        svc.set("ns:news:1", "v", Expiry::Never).await.unwrap();

        assert_eq!(svc.delete_prefix("ns:quote:").await.unwrap(), 5);
        assert_eq!(svc.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_outage() {
        let svc = MemoryCacheService::new();
        svc.set_available(false);

        assert!(matches!(
            svc.get("k").await,
            Err(CacheError::ConnectionError(_))
        ));
        assert!(svc.set("k", "v", Expiry::Never).await.is_err());
        assert!(!svc.health_check().await.unwrap());

        svc.set_available(true);
        assert!(svc.set("k", "v", Expiry::Never).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_latency_delays_calls() {
        let svc = MemoryCacheService::new();
        svc.set_latency(Duration::from_millis(200));

        let started = Instant::now();
        svc.set("k", "v", Expiry::Never).await.unwrap();
        assert!(svc.get("k").await.unwrap().is_some());
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = MemoryCacheService::new();
        let b = a.clone();
        a.set("k", "v", Expiry::Never).await.unwrap();
        assert!(b.get("k").await.unwrap().is_some());
    }
}
