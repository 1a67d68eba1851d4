//! Identity map keyed by primary key.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

struct Entry<T: ?Sized> {
    object: Weak<T>,
    tick: u64,
}

struct CacheState<T: ?Sized> {
    entries: HashMap<i64, Entry<T>>,
    /// tick -> key, oldest first.
    recency: BTreeMap<u64, i64>,
    next_tick: u64,
    max_size: Option<usize>,
}

impl<T: ?Sized> CacheState<T> {
    fn touch(&mut self, key: i64) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key);
        }
    }

    fn remove(&mut self, key: i64) -> Option<Entry<T>> {
        let entry = self.entries.remove(&key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    /// Drop bookkeeping for the oldest entries until the size bound holds.
    /// Expired entries go first since they cost nothing.
    fn enforce_bound(&mut self, stats: &CacheStats) {
        let Some(max) = self.max_size else {
            return;
        };
        if self.entries.len() <= max {
            return;
        }
        self.purge_expired();
        while self.entries.len() > max {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            stats.evictions.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    fn purge_expired(&mut self) -> usize {
        let expired: Vec<i64> = self
            .entries
            .iter()
            .filter(|(_, e)| e.object.strong_count() == 0)
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            self.remove(*key);
        }
        expired.len()
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Get eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Per-class map from primary key to the single live instance of that row.
///
/// The cache only holds weak references: an entry disappears on its own once
/// the application drops the last strong reference. The optional size bound
/// evicts the least recently touched entries, which removes the lookup
/// entry but never the object, so identity is preserved for objects that are
/// still referenced elsewhere only until their next lookup misses.
pub struct IdentityCache<T: ?Sized> {
    state: Mutex<CacheState<T>>,
    stats: CacheStats,
}

impl<T: ?Sized> Default for IdentityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> IdentityCache<T> {
    /// Create an unbounded cache.
    pub fn new() -> Self {
        Self::with_maximum_size(None)
    }

    /// Create a cache bounded to `max_size` entries (`None` = unbounded).
    pub fn with_maximum_size(max_size: Option<usize>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                max_size,
            }),
            stats: CacheStats::default(),
        }
    }

    /// Register `object` as the instance for `key`.
    ///
    /// # Panics
    ///
    /// Panics if a live instance is already registered for `key`.
    pub fn insert(&self, key: i64, object: &Arc<T>) -> Arc<T> {
        let mut state = self.state.lock();
        if let Some(existing) = state.entries.get(&key) {
            assert!(
                existing.object.strong_count() == 0,
                "identity cache already holds a live instance for key {key}"
            );
            state.remove(key);
        }
        let tick = state.next_tick;
        state.next_tick += 1;
        state.entries.insert(
            key,
            Entry {
                object: Arc::downgrade(object),
                tick,
            },
        );
        state.recency.insert(tick, key);
        state.enforce_bound(&self.stats);
        object.clone()
    }

    /// Return the live instance for `key`, if any.
    pub fn get(&self, key: i64) -> Option<Arc<T>> {
        let mut state = self.state.lock();
        let found = state.entries.get(&key).map(|e| e.object.upgrade());
        match found {
            Some(Some(object)) => {
                state.touch(key);
                self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
                Some(object)
            }
            Some(None) => {
                state.remove(key);
                self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
                None
            }
            None => {
                self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
                None
            }
        }
    }

    /// Return the live instance for `key`, or build and register one.
    ///
    /// The lookup and the insert happen under one lock, so two threads
    /// loading the same row end up sharing the instance built first.
    pub fn get_or_insert_with(&self, key: i64, build: impl FnOnce() -> Arc<T>) -> Arc<T> {
        let mut state = self.state.lock();
        if let Some(object) = state.entries.get(&key).and_then(|e| e.object.upgrade()) {
            state.touch(key);
            self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return object;
        }
        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        state.remove(key);

        let object = build();
        let tick = state.next_tick;
        state.next_tick += 1;
        state.entries.insert(
            key,
            Entry {
                object: Arc::downgrade(&object),
                tick,
            },
        );
        state.recency.insert(tick, key);
        state.enforce_bound(&self.stats);
        object
    }

    /// Forget the entry for `key`. Returns whether an entry existed.
    pub fn remove(&self, key: i64) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Change the size bound, evicting immediately if needed.
    pub fn set_maximum_size(&self, max_size: Option<usize>) {
        let mut state = self.state.lock();
        state.max_size = max_size;
        state.enforce_bound(&self.stats);
    }

    /// The current size bound.
    pub fn maximum_size(&self) -> Option<usize> {
        self.state.lock().max_size
    }

    /// Drop entries whose object has been released. Returns how many.
    pub fn purge_expired(&self) -> usize {
        self.state.lock().purge_expired()
    }

    /// Number of tracked entries, expired ones included.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache tracks no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of entries whose object is still alive.
    pub fn live_keys(&self) -> Vec<i64> {
        let state = self.state.lock();
        let mut keys: Vec<i64> = state
            .entries
            .iter()
            .filter(|(_, e)| e.object.strong_count() > 0)
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_same_instance() {
        let cache: IdentityCache<String> = IdentityCache::new();
        let obj = Arc::new("row 1".to_string());
        cache.insert(1, &obj);

        let a = cache.get(1).unwrap();
        let b = cache.get(1).unwrap();
        assert!(Arc::ptr_eq(&a, &obj));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats().hits(), 2);
    }

    #[test]
    fn test_entry_expires_with_last_owner() {
        let cache: IdentityCache<String> = IdentityCache::new();
        let obj = Arc::new("row".to_string());
        cache.insert(7, &obj);
        drop(obj);

        assert!(cache.get(7).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    #[should_panic(expected = "live instance")]
    fn test_double_insert_panics() {
        let cache: IdentityCache<String> = IdentityCache::new();
        let a = Arc::new("a".to_string());
        let b = Arc::new("b".to_string());
        cache.insert(1, &a);
        cache.insert(1, &b);
    }

    #[test]
    fn test_reinsert_after_expiry() {
        let cache: IdentityCache<String> = IdentityCache::new();
        let a = Arc::new("a".to_string());
        cache.insert(1, &a);
        drop(a);

        let b = Arc::new("b".to_string());
        cache.insert(1, &b);
        assert!(Arc::ptr_eq(&cache.get(1).unwrap(), &b));
    }

    #[test]
    fn test_eviction_is_recency_based_and_advisory() {
        let cache: IdentityCache<String> = IdentityCache::with_maximum_size(Some(2));
        let objs: Vec<Arc<String>> = (0..3).map(|i| Arc::new(format!("row {i}"))).collect();

        cache.insert(0, &objs[0]);
        cache.insert(1, &objs[1]);
        // touch 0 so 1 becomes the oldest
        cache.get(0).unwrap();
        cache.insert(2, &objs[2]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions(), 1);
        assert!(cache.get(1).is_none());
        assert!(cache.get(0).is_some());
        assert!(cache.get(2).is_some());

        // the evicted object itself is untouched
        assert_eq!(*objs[1], "row 1");
        assert_eq!(Arc::strong_count(&objs[1]), 1);
    }

    #[test]
    fn test_expired_entries_evicted_before_live_ones() {
        let cache: IdentityCache<String> = IdentityCache::with_maximum_size(Some(2));
        let keep = Arc::new("keep".to_string());
        cache.insert(1, &keep);
        {
            let temp = Arc::new("temp".to_string());
            cache.insert(2, &temp);
        }
        let third = Arc::new("third".to_string());
        cache.insert(3, &third);

        assert_eq!(cache.live_keys(), vec![1, 3]);
        assert_eq!(cache.stats().evictions(), 0);
    }

    #[test]
    fn test_shrinking_bound() {
        let cache: IdentityCache<String> = IdentityCache::new();
        let objs: Vec<Arc<String>> = (0..5).map(|i| Arc::new(i.to_string())).collect();
        for (i, obj) in objs.iter().enumerate() {
            cache.insert(i as i64, obj);
        }
        cache.set_maximum_size(Some(3));
        assert_eq!(cache.live_keys(), vec![2, 3, 4]);
        assert_eq!(cache.maximum_size(), Some(3));
    }

    #[test]
    fn test_get_or_insert_with_reuses_live_instance() {
        let cache: IdentityCache<String> = IdentityCache::new();
        let first = cache.get_or_insert_with(5, || Arc::new("first".into()));
        let second = cache.get_or_insert_with(5, || Arc::new("second".into()));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, "first");
    }
}
