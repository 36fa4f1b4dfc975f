//! In-memory cache for storing key-value pairs with per-entry TTL.
//!
//! Uses moka's high-performance concurrent cache implementation.

use std::time::{Duration, Instant};

use moka::{Expiry, sync::Cache};

#[derive(Clone)]
struct Entry<V> {
    value: V,
    ttl: Option<Duration>,
}

struct EntryExpiry;

impl<K, V> Expiry<K, Entry<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &K,
        entry: &Entry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &K,
        entry: &Entry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// Thread-safe in-memory cache with configurable capacity and optional
/// per-entry time-to-live.
///
/// Used for the ephemeral progress state of a run:
/// - finished-node lists (`MemCache<String, Vec<NodeId>>`)
/// - per-node streaming buffers and status markers
///
/// Loss of this cache degrades progress visibility for polling clients but
/// never affects the correctness of the final persisted result.
#[derive(Clone)]
pub struct MemCache<K, V> {
    variables: Cache<K, Entry<V>>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(capacity: usize) -> Self {
        Self {
            variables: Cache::builder().max_capacity(capacity as u64).expire_after(EntryExpiry).build(),
        }
    }

    /// Set a value, kept until evicted or until `ttl` elapses.
    pub fn set(
        &self,
        key: K,
        value: V,
        ttl: Option<Duration>,
    ) {
        self.variables.insert(key, Entry {
            value,
            ttl,
        });
    }

    /// Get a value through key `&K`.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.variables.get(key).map(|e| e.value)
    }

    /// Remove a value through key `&K`.
    pub fn remove(
        &self,
        key: &K,
    ) {
        self.variables.remove(key);
    }
}
