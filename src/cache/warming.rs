//! # Cache Warming
//!
//! A hot tier hit whose remaining lifetime has dropped to the warming
//! threshold triggers a refresh. Refreshes are produced by a [`CacheWarmer`]
//! registered for a key prefix; the longest matching prefix wins. At most
//! one refresh per key is in flight.

use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Produces fresh values for keys about to expire
#[async_trait]
pub trait CacheWarmer: Send + Sync {
    /// Fresh value for the logical (un-namespaced) `key`, or `None` to let
    /// the entry expire
    async fn refresh(&self, key: &str) -> CacheResult<Option<Value>>;
}

/// Adapter turning an async closure into a [`CacheWarmer`]
pub struct FnWarmer<F> {
    refresh: F,
}

impl<F> FnWarmer<F> {
    pub fn new(refresh: F) -> Self {
        Self { refresh }
    }
}

impl<F> std::fmt::Debug for FnWarmer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnWarmer").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> CacheWarmer for FnWarmer<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = CacheResult<Option<Value>>> + Send + 'static,
{
    async fn refresh(&self, key: &str) -> CacheResult<Option<Value>> {
        (self.refresh)(key.to_string()).await
    }
}

/// True when at most `threshold` of `total` lifetime remains
pub fn needs_warming(remaining: Duration, total: Duration, threshold: f64) -> bool {
    remaining.as_secs_f64() <= total.as_secs_f64() * threshold
}

struct Registration {
    prefix: String,
    warmer: Arc<dyn CacheWarmer>,
}

/// Registered warmers plus the set of keys currently being refreshed
#[derive(Default)]
pub struct WarmingRegistry {
    warmers: RwLock<Vec<Registration>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for WarmingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefixes: Vec<String> = self
            .warmers
            .read()
            .iter()
            .map(|r| r.prefix.clone())
            .collect();
        f.debug_struct("WarmingRegistry")
            .field("prefixes", &prefixes)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl WarmingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `warmer` for keys starting with `prefix`, replacing any
    /// warmer already registered for the same prefix
    pub fn register(&self, prefix: impl Into<String>, warmer: Arc<dyn CacheWarmer>) {
        let prefix = prefix.into();
        let mut warmers = self.warmers.write();
        warmers.retain(|r| r.prefix != prefix);
        warmers.push(Registration { prefix, warmer });
    }

    pub fn unregister(&self, prefix: &str) -> bool {
        let mut warmers = self.warmers.write();
        let before = warmers.len();
        warmers.retain(|r| r.prefix != prefix);
        warmers.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.warmers.read().is_empty()
    }

    /// Warmer with the longest prefix matching `key`
    pub fn find(&self, key: &str) -> Option<Arc<dyn CacheWarmer>> {
        self.warmers
            .read()
            .iter()
            .filter(|r| key.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len())
            .map(|r| r.warmer.clone())
    }

    /// Claim `key` for a refresh; `None` if one is already in flight
    pub fn begin(&self, key: &str) -> Option<InFlightGuard> {
        if self.in_flight.lock().insert(key.to_string()) {
            Some(InFlightGuard {
                in_flight: self.in_flight.clone(),
                key: key.to_string(),
            })
        } else {
            None
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Releases the in-flight claim for a key when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// Run `warmer` for `key`, reporting any failure as
/// [`CacheError::WarmingError`]
pub async fn refresh_with(warmer: &dyn CacheWarmer, key: &str) -> CacheResult<Option<Value>> {
    warmer.refresh(key).await.map_err(|error| match error {
        CacheError::WarmingError(_) => error,
        other => CacheError::WarmingError(format!("refresh of '{key}' failed: {other}")),
    })
}
