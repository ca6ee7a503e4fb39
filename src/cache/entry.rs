//! Cache entry and lifetime types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifetime of a cached value
///
/// Non-positive second counts map to [`Expiry::Never`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expiry {
    Never,
    After(Duration),
}

impl Expiry {
    pub fn from_seconds(seconds: i64) -> Self {
        if seconds <= 0 {
            Self::Never
        } else {
            Self::After(Duration::from_secs(seconds.unsigned_abs()))
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After(ttl) => Some(*ttl),
        }
    }

    /// Whole seconds, `0` for values that never expire
    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Never => 0,
            Self::After(ttl) => i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        Self::After(ttl)
    }
}

/// Tier a cached value was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Written directly into the hot tier
    Hot,
    /// Promoted from the shared tier
    Shared,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hot => write!(f, "hot"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

/// A value held by the hot tier together with its access statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    pub expiry: Expiry,
    pub tier: CacheTier,
    pub hit_count: u64,
    created_at: Instant,
    last_accessed_at: Instant,
    created_at_wall: DateTime<Utc>,
    last_accessed_wall: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, data: Value, expiry: Expiry, tier: CacheTier) -> Self {
        let now = Instant::now();
        let wall = Utc::now();
        Self {
            key: key.into(),
            data,
            expiry,
            tier,
            hit_count: 0,
            created_at: now,
            last_accessed_at: now,
            created_at_wall: wall,
            last_accessed_wall: wall,
        }
    }

    /// True once strictly more than the TTL has elapsed since insertion
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expiry {
            Expiry::Never => false,
            Expiry::After(ttl) => now.saturating_duration_since(self.created_at) > ttl,
        }
    }

    pub fn record_access(&mut self) {
        self.hit_count += 1;
        self.last_accessed_at = Instant::now();
        self.last_accessed_wall = Utc::now();
    }

    /// Lifetime left, `None` for entries that never expire
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expiry
            .as_duration()
            .map(|ttl| ttl.saturating_sub(self.age()))
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_time(&self) -> Duration {
        self.last_accessed_at.elapsed()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at_wall
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiry_from_seconds() {
        assert_eq!(Expiry::from_seconds(0), Expiry::Never);
        assert_eq!(Expiry::from_seconds(-5), Expiry::Never);
        assert_eq!(
            Expiry::from_seconds(10),
            Expiry::After(Duration::from_secs(10))
        );
        assert_eq!(Expiry::from_seconds(10).as_seconds(), 10);
        assert_eq!(Expiry::Never.as_seconds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_strict() {
        let entry = CacheEntry::new("k", json!(1), Expiry::from_seconds(1), CacheTier::Hot);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!entry.is_expired(), "exactly ttl elapsed is still fresh");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(entry.is_expired());
        assert_eq!(entry.remaining_ttl(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_expires() {
        let entry = CacheEntry::new("k", json!("v"), Expiry::Never, CacheTier::Hot);
        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert!(!entry.is_expired());
        assert_eq!(entry.remaining_ttl(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_access() {
        let mut entry = CacheEntry::new("k", json!({"a": 1}), Expiry::Never, CacheTier::Shared);
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(entry.idle_time(), Duration::from_secs(3));

        entry.record_access();
        entry.record_access();
        assert_eq!(entry.hit_count, 2);
        assert_eq!(entry.idle_time(), Duration::ZERO);
        assert_eq!(entry.age(), Duration::from_secs(3));
    }
}
