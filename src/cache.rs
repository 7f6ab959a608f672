// ABOUTME: In-memory TTL response cache with deterministic request fingerprints
// ABOUTME: Bounded LRU storage with lazy eviction of expired entries on lookup
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Response Cache
//!
//! Time-bounded cache for upstream API responses. Keys are deterministic
//! fingerprints of the endpoint plus its parameters serialized with sorted
//! keys, so semantically identical requests with differently ordered
//! parameters collide on the same entry. Entries older than the TTL are
//! never returned and are evicted lazily on the next lookup.

use lru::LruCache;
use serde_json::Value;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// Cached response with its insertion time
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    cached_at: Instant,
}

/// Deterministic cache key from an endpoint and its query parameters
///
/// Parameters are rendered through a `BTreeMap`, which makes the sorted-key
/// guarantee structural rather than an accident of serializer field order.
#[must_use]
pub fn fingerprint(endpoint: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return endpoint.to_owned();
    }
    let sorted: BTreeMap<&str, &str> = params
        .iter()
        .map(|(name, value)| (*name, value.as_str()))
        .collect();
    // BTreeMap iteration order is sorted, so serialization is canonical
    let serialized = serde_json::to_string(&sorted).unwrap_or_default();
    format!("{endpoint}:{serialized}")
}

/// Bounded in-memory cache for upstream response payloads
pub struct ResponseCache {
    store: LruCache<String, CacheEntry>,
    ttl: Duration,
}

impl ResponseCache {
    /// Fallback capacity when configured with zero entries
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(256) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// Create a cache holding at most `max_entries` payloads for `ttl` each
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        Self {
            store: LruCache::new(capacity),
            ttl,
        }
    }

    /// Return the cached payload if present and younger than the TTL
    ///
    /// A stale entry is evicted before `None` is returned.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let entry = self.store.get(key)?;
        if entry.cached_at.elapsed() < self.ttl {
            tracing::debug!(key, "Cache hit");
            return Some(entry.payload.clone());
        }
        self.store.pop(key);
        tracing::debug!(key, "Evicted stale cache entry");
        None
    }

    /// Store a payload under the given fingerprint
    ///
    /// Called only after a successful upstream response; failed or timed-out
    /// calls never create an entry.
    pub fn insert(&mut self, key: String, payload: Value) {
        tracing::debug!(key = %key, "Cached response");
        self.store.push(
            key,
            CacheEntry {
                payload,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every cached entry
    pub fn clear(&mut self) {
        self.store.clear();
        tracing::info!("Response cache cleared");
    }

    /// Number of entries currently held, including not-yet-evicted stale ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
