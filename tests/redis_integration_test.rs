//! End-to-end tests against a running Redis (behind the test-services feature)
//!
//! Tests return early when Redis is unreachable.

#![cfg(all(feature = "test-services", feature = "cache-redis"))]

mod common;

use serde_json::json;
use tiered_cache::cache::{CacheCoordinator, SetOptions, WriteStrategy};
use tiered_cache::config::CacheConfig;
use tracing::warn;

fn redis_config() -> CacheConfig {
    let mut config = common::test_config();
    config.shared_tier.backend = "redis".to_string();
    config.shared_tier.url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    config.shared_tier.connection_timeout_ms = 2000;
    config
}

async fn connect(config: CacheConfig) -> Option<CacheCoordinator> {
    let cache = CacheCoordinator::connect(config).await.ok()?;
    if cache.get_metrics().shared_backend != "redis" {
        warn!("Skipping Redis test (not available)");
        return None;
    }
    Some(cache)
}

#[tokio::test]
async fn test_two_processes_share_values() {
    common::init_test_logging();
    let config = redis_config();
    let Some(writer) = connect(config.clone()).await else { return };
    let Some(reader) = connect(config).await else { return };

    writer
        .set("stock:SAP.DE", json!({"price": 123.45}))
        .await;
    assert_eq!(reader.get("stock:SAP.DE").await, Some(json!({"price": 123.45})));
    assert_eq!(reader.get_metrics().l2_hits, 1);

    writer.clear(None).await;
    writer.shutdown().await;
    reader.shutdown().await;
}

#[tokio::test]
async fn test_write_back_and_clear_pattern() {
    let Some(cache) = connect(redis_config()).await else { return };

    for i in 0..5 {
        cache
            .set_with(&format!("user:{i}"), json!(i), SetOptions::strategy(WriteStrategy::WriteBack))
            .await;
    }
    cache.set("order:1", json!("keep")).await;
    cache.flush_background().await;

    let outcome = cache.clear(Some("user:*")).await;
    assert_eq!(outcome.hot_removed, 5);
    assert_eq!(outcome.shared_removed, 5);
    assert_eq!(cache.get("order:1").await, Some(json!("keep")));

    cache.clear(None).await;
    cache.shutdown().await;
}
