// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::{CacheStore, Result};

/// Expiry used when `now + ttl` overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Slot<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// An in-process [`CacheStore`] backed by a hash map.
///
/// Expiry is measured on the tokio clock. Entries are pruned lazily: an expired entry is
/// dropped when it is read, and all expired entries are swept before a bounded store evicts
/// anything live.
///
/// A store created with [`with_max_entries`][MemoryStore::with_max_entries] never holds more
/// than that many entries. When a new key arrives at capacity, the live entry closest to
/// expiry is evicted.
///
/// Cloning a `MemoryStore` yields a handle to the same underlying map.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use flightline::{CacheStore, MemoryStore};
///
/// # async fn example() -> flightline::cache::Result<()> {
/// let store = MemoryStore::<String, u32>::new();
/// store.put("elo".to_string(), 2100, Duration::from_secs(30)).await?;
/// assert_eq!(store.get(&"elo".to_string()).await?, Some(2100));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore<K, V> {
    slots: Arc<Mutex<HashMap<K, Slot<V>>>>,
    max_entries: Option<usize>,
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self {
            slots: Arc::default(),
            max_entries: None,
        }
    }
}

impl<K, V> MemoryStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding at most `max_entries` entries.
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is 0.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        assert!(max_entries > 0, "max_entries must be at least 1");
        Self {
            slots: Arc::default(),
            max_entries: Some(max_entries),
        }
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }

    fn is_full(&self, len: usize) -> bool {
        self.max_entries.is_some_and(|max| len >= max)
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(slot) if slot.is_live(now) => Some(slot.value.clone()),
            Some(_) => {
                slots.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE);
        let mut slots = self.slots.lock();

        if !slots.contains_key(&key) && self.is_full(slots.len()) {
            slots.retain(|_, slot| slot.is_live(now));
            if self.is_full(slots.len()) {
                let victim = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.expires_at)
                    .map(|(victim, _)| victim.clone());
                if let Some(victim) = victim {
                    slots.remove(&victim);
                }
            }
        }

        slots.insert(key, Slot { value, expires_at });
    }
}

impl<K, V> CacheStore<K, V> for MemoryStore<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.lookup(key))
    }

    async fn put(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        self.store(key, value, ttl);
        Ok(())
    }

    async fn invalidate(&self, key: &K) -> Result<()> {
        self.slots.lock().remove(key);
        Ok(())
    }

    fn len(&self) -> Option<usize> {
        Some(self.slots.lock().len())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn entry_visible_until_ttl_elapses() {
        let store = MemoryStore::new();
        store.put(key("shroud"), 1, Duration::from_secs(30)).await.unwrap();

        tokio::time::advance(Duration::from_millis(29_999)).await;
        assert_eq!(store.get(&key("shroud")).await.unwrap(), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get(&key("shroud")).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_dropped_on_read() {
        let store = MemoryStore::new();
        store.put(key("a"), 1, Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.len(), Some(1));
        assert_eq!(store.get(&key("a")).await.unwrap(), None);
        assert_eq!(store.len(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites_existing_entry() {
        let store = MemoryStore::new();
        store.put(key("a"), 1, Duration::from_secs(1)).await.unwrap();
        store.put(key("a"), 2, Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get(&key("a")).await.unwrap(), Some(2));
        assert_eq!(store.len(), Some(1));
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let store = MemoryStore::new();
        store.put(key("a"), 1, Duration::from_secs(60)).await.unwrap();
        store.invalidate(&key("a")).await.unwrap();

        assert_eq!(store.get(&key("a")).await.unwrap(), None);
        assert_eq!(store.is_empty(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_store_prefers_sweeping_expired_entries() {
        let store = MemoryStore::with_max_entries(2);
        store.put(key("old"), 1, Duration::from_secs(1)).await.unwrap();
        store.put(key("keep"), 2, Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        store.put(key("new"), 3, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.len(), Some(2));
        assert_eq!(store.get(&key("keep")).await.unwrap(), Some(2));
        assert_eq!(store.get(&key("new")).await.unwrap(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_store_evicts_entry_closest_to_expiry() {
        let store = MemoryStore::with_max_entries(2);
        store.put(key("soon"), 1, Duration::from_secs(10)).await.unwrap();
        store.put(key("later"), 2, Duration::from_secs(60)).await.unwrap();

        store.put(key("new"), 3, Duration::from_secs(30)).await.unwrap();

        assert_eq!(store.get(&key("soon")).await.unwrap(), None);
        assert_eq!(store.get(&key("later")).await.unwrap(), Some(2));
        assert_eq!(store.get(&key("new")).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn bounded_store_overwrite_at_capacity_keeps_others() {
        let store = MemoryStore::with_max_entries(2);
        store.put(key("a"), 1, Duration::from_secs(10)).await.unwrap();
        store.put(key("b"), 2, Duration::from_secs(60)).await.unwrap();

        store.put(key("a"), 10, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get(&key("a")).await.unwrap(), Some(10));
        assert_eq!(store.get(&key("b")).await.unwrap(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_counts_dropped_entries() {
        let store = MemoryStore::new();
        store.put(key("a"), 1, Duration::from_secs(1)).await.unwrap();
        store.put(key("b"), 2, Duration::from_secs(1)).await.unwrap();
        store.put(key("c"), 3, Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), Some(1));
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _store = MemoryStore::<String, u32>::with_max_entries(0);
    }
}
