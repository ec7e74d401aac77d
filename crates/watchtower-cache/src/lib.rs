// crates/watchtower-cache/src/lib.rs
// ============================================================================
// Module: Watchtower Cache
// Description: Short-TTL key-value cache of the last normalized payload
//              fetched per source.
// Purpose: Let a sync pass skip parsing when a recent fetch is already
//          cached (spec §4.3, C3).
// Dependencies: async-trait, tokio
// ============================================================================

//! ## Overview
//! The cache stores the *normalized* payload, not the raw HTTP body, so a
//! hit bypasses parsing entirely. Callers MUST treat [`CacheError`] as a
//! degrade-to-live-fetch signal, never as a hard failure: this crate only
//! defines the seam; the silent-degrade policy lives in the sync engine
//! that calls it.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Errors reported by a [`Cache`] implementation.
///
/// # Invariants
/// - Every variant indicates "treat this as a cache miss", never a reason
///   to fail the caller's overall operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The cache backend could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    /// The cached value could not be deserialized.
    #[error("cache entry corrupt: {0}")]
    Corrupt(String),
}

/// A short-TTL key-value cache.
///
/// # Invariants
/// - `set_ex` entries expire after `ttl` and are no longer returned by `get`.
/// - Implementations may fail; callers must degrade to a live fetch.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Looks up `key`, returning `Ok(None)` on a miss (including an expired
    /// entry) and `Ok(Some(bytes))` on a hit.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend is unavailable or the stored
    /// value is corrupt. Callers must treat this identically to a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` under `key` with the given time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend is unavailable. Callers must
    /// proceed as though the write simply did not happen.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// Builds the canonical cache key for a feed source (spec §4.3:
/// `watchtower:cache:{source_id}`).
#[must_use]
pub fn cache_key(source_id: &str) -> String {
    format!("watchtower:cache:{source_id}")
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// An in-process, in-memory [`Cache`] backed by a mutex-guarded map.
///
/// Suitable as the default cache for a single-process deployment and for
/// tests; a distributed deployment would swap in a Redis-backed
/// implementation behind the same trait without touching callers.
#[derive(Default)]
pub struct InMemoryCache {
    /// Entries keyed by cache key.
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))?;
        let Some(entry) = guard.get(key) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            guard.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| CacheError::Unavailable("cache lock poisoned".to_string()))?;
        guard.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

/// A [`Cache`] that always fails, used to exercise the silent-degrade path
/// in tests of callers that consult a cache.
#[derive(Default)]
pub struct UnavailableCache;

#[async_trait]
impl Cache for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Unavailable("simulated outage".to_string()))
    }

    async fn set_ex(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("simulated outage".to_string()))
    }
}
