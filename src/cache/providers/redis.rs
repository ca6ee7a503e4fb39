//! Redis shared tier provider
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections
//! with automatic reconnection. Dragonfly speaks the same protocol and uses
//! this provider too. Requires the `cache-redis` feature flag.

use crate::cache::entry::Expiry;
use crate::cache::key::glob_escape;
use crate::cache::traits::{SharedCacheService, SharedValue};
use crate::constants::SCAN_BATCH_SIZE;
use crate::error::{CacheError, CacheResult};
use crate::logging::redact_url;
use std::time::Duration;
use tracing::debug;

/// Redis-backed shared tier using ConnectionManager
///
/// Pattern deletes use SCAN so the server is never blocked.
#[derive(Clone)]
pub struct RedisCacheService {
    connection_manager: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheService")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisCacheService {
    /// Connect to `url`, failing if no connection is established within
    /// `connection_timeout`
    pub async fn connect(url: &str, connection_timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {e}"))
        })?;

        let connection_manager =
            tokio::time::timeout(connection_timeout, redis::aio::ConnectionManager::new(client))
                .await
                .map_err(|_| {
                    CacheError::Timeout(format!(
                        "Redis connect exceeded {}ms",
                        connection_timeout.as_millis()
                    ))
                })?
                .map_err(|e| {
                    CacheError::ConnectionError(format!("Failed to connect to Redis: {e}"))
                })?;

        debug!(url = %redact_url(url), "Redis cache service connected");

        Ok(Self { connection_manager })
    }
}

fn map_redis_error(operation: &str, error: redis::RedisError) -> CacheError {
    if error.is_timeout() {
        CacheError::Timeout(format!("Redis {operation} timed out: {error}"))
    } else if error.is_connection_dropped() || error.is_connection_refusal() || error.is_io_error()
    {
        CacheError::ConnectionError(format!("Redis {operation} failed: {error}"))
    } else {
        CacheError::BackendError(format!("Redis {operation} failed: {error}"))
    }
}

/// Convert a `PTTL` reply: -2 missing key, -1 no expiry
fn remaining_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

impl SharedCacheService for RedisCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<SharedValue>> {
        let mut conn = self.connection_manager.clone();
        let (payload, pttl): (Option<String>, i64) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("GET", e))?;

        match payload {
            Some(payload) => {
                debug!(key = key, "Cache HIT");
                Ok(Some(SharedValue {
                    payload,
                    remaining_ttl: remaining_from_pttl(pttl),
                }))
            }
            None => {
                debug!(key = key, "Cache MISS");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, payload: &str, expiry: Expiry) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        match expiry {
            Expiry::After(ttl) => {
                let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                redis::cmd("PSETEX")
                    .arg(key)
                    .arg(ttl_millis)
                    .arg(payload)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| map_redis_error("PSETEX", e))?;
                debug!(key = key, ttl_millis = ttl_millis, "Cache SET");
            }
            Expiry::Never => {
                redis::cmd("SET")
                    .arg(key)
                    .arg(payload)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| map_redis_error("SET", e))?;
                debug!(key = key, "Cache SET (no expiry)");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("DEL", e))?;

        debug!(key = key, "Cache DEL");
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut conn = self.connection_manager.clone();
        let pattern = format!("{}*", glob_escape(prefix));
        let mut deleted: u64 = 0;
        let mut cursor: u64 = 0;

        // SCAN iterates without blocking the server
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut conn)
                .await
                .map_err(|e| map_redis_error("SCAN", e))?;

            if !keys.is_empty() {
                let count: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| map_redis_error("DEL (batch)", e))?;
                deleted += count;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = deleted, "Cache pattern DEL");
        Ok(deleted)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("PING", e))?;

        Ok(pong == "PONG")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }

    fn is_distributed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_from_pttl() {
        assert_eq!(remaining_from_pttl(-2), None);
        assert_eq!(remaining_from_pttl(-1), None);
        assert_eq!(remaining_from_pttl(1500), Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_connection_error() {
        let result = RedisCacheService::connect("not-a-url", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(CacheError::ConnectionError(_))));
    }

    // Integration tests require a running Redis instance (behind test-services feature)
    #[cfg(feature = "test-services")]
    mod integration {
        use super::*;
        use tracing::warn;

        async fn connect() -> Option<RedisCacheService> {
            let url = std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string());
            match RedisCacheService::connect(&url, Duration::from_secs(2)).await {
                Ok(svc) => Some(svc),
                Err(e) => {
                    warn!("Skipping Redis test (not available): {}", e);
                    None
                }
            }
        }

        #[tokio::test]
        async fn test_redis_crud_operations() {
            let Some(svc) = connect().await else { return };
            let key = format!("test:crud:{}", uuid::Uuid::new_v4());
            let payload = r#"{"symbol":"SAP.DE","price":123.45}"#;

            svc.set(&key, payload, Expiry::from_seconds(60)).await.unwrap();

            let hit = svc.get(&key).await.unwrap().unwrap();
            assert_eq!(hit.payload, payload);
            let remaining = hit.remaining_ttl.unwrap();
            assert!(remaining <= Duration::from_secs(60));
            assert!(remaining > Duration::from_secs(50));

            svc.delete(&key).await.unwrap();
            assert_eq!(svc.get(&key).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_redis_ttl_expiry() {
            let Some(svc) = connect().await else { return };
            let key = format!("test:ttl:{}", uuid::Uuid::new_v4());

            svc.set(&key, "temporary", Expiry::from_seconds(1))
                .await
                .unwrap();
            assert!(svc.get(&key).await.unwrap().is_some());

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(svc.get(&key).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_redis_no_expiry() {
            let Some(svc) = connect().await else { return };
            let key = format!("test:never:{}", uuid::Uuid::new_v4());

            svc.set(&key, "forever", Expiry::Never).await.unwrap();
            let hit = svc.get(&key).await.unwrap().unwrap();
            assert_eq!(hit.remaining_ttl, None);
            svc.delete(&key).await.unwrap();
        }

        #[tokio::test]
        async fn test_redis_prefix_delete() {
            let Some(svc) = connect().await else { return };
            let prefix = format!("test:pattern:{}:", uuid::Uuid::new_v4());

            for i in 0..5 {
                svc.set(&format!("{prefix}key{i}"), "value", Expiry::from_seconds(60))
                    .await
                    .unwrap();
            }

            assert_eq!(svc.delete_prefix(&prefix).await.unwrap(), 5);
            for i in 0..5 {
                assert!(svc.get(&format!("{prefix}key{i}")).await.unwrap().is_none());
            }
        }

        #[tokio::test]
        async fn test_redis_health_check() {
            let Some(svc) = connect().await else { return };
            assert!(svc.health_check().await.unwrap());
        }
    }
}
