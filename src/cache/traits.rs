//! Shared tier service trait.

use super::entry::Expiry;
use crate::error::CacheResult;
use std::time::Duration;

/// Payload read from the shared tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedValue {
    pub payload: String,
    /// Server-side lifetime left, when the backend reports one
    pub remaining_ttl: Option<Duration>,
}

/// Operations a shared tier backend provides
///
/// Implemented by the concrete providers (Redis, in-process memory, NoOp).
/// Keys are already namespaced; payloads are already encoded.
pub trait SharedCacheService: Send + Sync {
    /// Returns `Ok(Some(value))` on hit, `Ok(None)` on miss.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<SharedValue>>> + Send;

    /// Store a payload with a server-side lifetime
    fn set(
        &self,
        key: &str,
        payload: &str,
        expiry: Expiry,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete every key starting with `prefix`, returning how many were removed
    fn delete_prefix(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = CacheResult<u64>> + Send;

    fn health_check(&self) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    fn provider_name(&self) -> &'static str;

    /// Whether state is shared with other processes
    fn is_distributed(&self) -> bool;
}
