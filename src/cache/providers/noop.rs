//! No-op shared tier provider
//!
//! Always misses, always succeeds. Used when the shared tier is disabled or
//! could not be reached at startup.

use crate::cache::entry::Expiry;
use crate::cache::traits::{SharedCacheService, SharedValue};
use crate::error::CacheResult;

/// Shared tier that never stores anything
#[derive(Debug, Clone, Default)]
pub struct NoOpCacheService;

impl NoOpCacheService {
    pub fn new() -> Self {
        Self
    }
}

impl SharedCacheService for NoOpCacheService {
    async fn get(&self, _key: &str) -> CacheResult<Option<SharedValue>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _payload: &str, _expiry: Expiry) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> CacheResult<u64> {
        Ok(0)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}
