//! Result memoization for async functions.
//!
//! Results are stored under `func:{name}:{digest}` where the digest is the
//! first 8 hex characters of the SHA-256 of the JSON-serialized arguments.

use super::coordinator::{CacheCoordinator, SetOptions};
use super::entry::Expiry;
use crate::constants::{MEMOIZE_DIGEST_LEN, MEMOIZE_KEY_PREFIX};
use crate::error::CacheResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use tracing::debug;

/// Cache key for a call of `function_name` with `args`
pub fn function_cache_key<A: Serialize + ?Sized>(
    function_name: &str,
    args: &A,
) -> CacheResult<String> {
    let serialized = serde_json::to_string(args)?;
    let digest = format!("{:x}", Sha256::digest(serialized.as_bytes()));
    Ok(format!(
        "{MEMOIZE_KEY_PREFIX}:{function_name}:{}",
        &digest[..MEMOIZE_DIGEST_LEN]
    ))
}

/// Return the cached result for `function_name(args)` or run `compute` and
/// cache its result write-through with `ttl`
///
/// A cached value that no longer deserializes into `T` counts as a miss.
pub async fn memoize<A, T, F, Fut>(
    cache: &CacheCoordinator,
    function_name: &str,
    args: &A,
    ttl: Expiry,
    compute: F,
) -> CacheResult<T>
where
    A: Serialize + ?Sized,
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let key = function_cache_key(function_name, args)?;

    match cache.get_as::<T>(&key).await {
        Ok(Some(cached)) => {
            debug!(function = function_name, key = %key, "Memoized result HIT");
            return Ok(cached);
        }
        Ok(None) => {}
        Err(e) => {
            debug!(function = function_name, key = %key, error = %e, "Memoized result unreadable, recomputing");
        }
    }

    let result = compute().await;
    cache
        .set_as(&key, &result, SetOptions::default().with_ttl(ttl))
        .await?;
    Ok(result)
}
