//! Shared helpers for cache integration tests

#![allow(dead_code)]

use tiered_cache::cache::providers::MemoryCacheService;
use tiered_cache::cache::{CacheCoordinator, SharedTier};
use tiered_cache::config::CacheConfig;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}

/// Test configuration under a unique namespace
pub fn test_config() -> CacheConfig {
    let mut config = CacheConfig::for_test();
    config.namespace = format!("test_{}", uuid::Uuid::new_v4().simple());
    config
}

pub fn memory_shared_tier(service: &MemoryCacheService, config: &CacheConfig) -> SharedTier {
    SharedTier::memory(
        service.clone(),
        config.shared_tier.operation_timeout(),
        config
            .circuit_breaker
            .enabled
            .then(|| config.circuit_breaker.to_resilience_config()),
    )
}

/// Coordinator over an in-process shared tier; the store is returned so
/// tests can inspect it or share it with a second coordinator
pub fn memory_coordinator(config: CacheConfig) -> (CacheCoordinator, MemoryCacheService) {
    let service = MemoryCacheService::new();
    let shared = memory_shared_tier(&service, &config);
    let cache = CacheCoordinator::with_shared_tier(config, shared)
        .expect("test configuration should be valid");
    (cache, service)
}

/// Coordinator with no shared tier
pub fn hot_only_coordinator(config: CacheConfig) -> CacheCoordinator {
    CacheCoordinator::with_shared_tier(config, SharedTier::noop())
        .expect("test configuration should be valid")
}
