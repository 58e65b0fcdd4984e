//! Bounded, TTL-evicted cache used by [`AssemblyContext`](crate::AssemblyContext).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

/// Cache with a fixed capacity and a per-entry time-to-live.
///
/// When full, expired entries go first, then the oldest ones.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Fetch a live entry.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.cached_at.elapsed() < ttl);

            if entries.len() >= self.capacity {
                let mut by_age: Vec<_> = entries
                    .iter()
                    .map(|(k, entry)| (k.clone(), entry.cached_at))
                    .collect();
                by_age.sort_by_key(|(_, cached_at)| *cached_at);

                let to_remove = entries.len() + 1 - self.capacity;
                for (k, _) in by_age.into_iter().take(to_remove) {
                    entries.remove(&k);
                }
                debug!(removed = to_remove, "Cache at capacity, evicted oldest entries");
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries.
    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, entry| entry.cached_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
