//! Capacity-limited maps with insertion-order eviction.
//!
//! Both caches remember the order in which entries were inserted and drop the
//! oldest one once the configured capacity is reached. Removal is O(1); the
//! order queue is cleaned lazily and compacted when it grows too stale.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A map bounded to `capacity` entries, evicting the oldest insertion first.
///
/// Inserting an existing key is a no-op and does not refresh its position.
#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (u64, V)>,
    order: VecDeque<(u64, K)>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> {
    /// Creates an empty cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Rebuilds a cache from entries listed oldest first.
    ///
    /// If there are more entries than `capacity`, the oldest are dropped.
    pub fn from_entries(capacity: usize, entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut cache = Self::new(capacity);
        for (key, value) in entries {
            cache.insert(key, value);
        }
        cache
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a new entry, evicting the oldest one if the cache is full.
    ///
    /// Returns false and leaves the cache untouched if `key` is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        while self.entries.len() >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        self.entries.insert(key, (seq, value));
        true
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(_, value)| value)
    }

    /// Looks up an entry mutably.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|(_, value)| value)
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes an entry, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key).map(|(_, value)| value);
        if removed.is_some() {
            self.maybe_compact();
        }
        removed
    }

    /// Keeps only the entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        self.entries.retain(|key, (_, value)| keep(key, value));
        self.maybe_compact();
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Iterates over live entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(key, (_, value))| (key, value))
    }

    /// Live entries, oldest first.
    #[must_use]
    pub fn entries_in_order(&self) -> Vec<(&K, &V)> {
        self.order
            .iter()
            .filter_map(|(seq, key)| {
                self.entries
                    .get_key_value(key)
                    .filter(|(_, (live_seq, _))| live_seq == seq)
                    .map(|(key, (_, value))| (key, value))
            })
            .collect()
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((seq, key)) = self.order.pop_front() {
            let live = self.entries.get(&key).is_some_and(|(live_seq, _)| *live_seq == seq);
            if live {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn maybe_compact(&mut self) {
        if self.order.len() > 2 * self.entries.len() + 16 {
            let entries = &self.entries;
            self.order
                .retain(|(seq, key)| entries.get(key).is_some_and(|(live_seq, _)| live_seq == seq));
        }
    }
}

/// A bounded map from a key to several distinct values.
///
/// Capacity counts `(key, value)` pairs, not keys. The oldest pair is evicted
/// first when the cache is full.
#[derive(Debug, Clone)]
pub struct BoundedMultiCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Vec<(u64, V)>>,
    order: VecDeque<(u64, K)>,
    len: usize,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone, V: PartialEq> BoundedMultiCache<K, V> {
    /// Creates an empty cache holding at most `capacity` pairs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            len: 0,
            next_seq: 0,
        }
    }

    /// Rebuilds a cache from pairs listed oldest first.
    pub fn from_entries(capacity: usize, entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut cache = Self::new(capacity);
        for (key, value) in entries {
            cache.insert(key, value);
        }
        cache
    }

    /// Maximum number of pairs.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored pairs.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a pair. Returns false if the exact pair is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self
            .entries
            .get(&key)
            .is_some_and(|values| values.iter().any(|(_, v)| *v == value))
        {
            return false;
        }
        while self.len >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        self.entries.entry(key).or_default().push((seq, value));
        self.len += 1;
        true
    }

    /// All values stored under `key`, oldest first.
    pub fn get_all(&self, key: &K) -> impl Iterator<Item = &V> {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|values| values.iter().map(|(_, value)| value))
    }

    /// Returns true if any value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Distinct keys currently stored.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Removes one pair. Returns true if it was present.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some(values) = self.entries.get_mut(key) else {
            return false;
        };
        let before = values.len();
        values.retain(|(_, v)| v != value);
        let removed = before - values.len();
        if values.is_empty() {
            self.entries.remove(key);
        }
        self.len -= removed;
        if removed > 0 {
            self.maybe_compact();
        }
        removed > 0
    }

    /// Keeps only the pairs for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) {
        let mut len = 0;
        self.entries.retain(|key, values| {
            values.retain(|(_, value)| keep(key, value));
            len += values.len();
            !values.is_empty()
        });
        self.len = len;
        self.maybe_compact();
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.len = 0;
    }

    /// Live pairs, oldest first.
    #[must_use]
    pub fn entries_in_order(&self) -> Vec<(&K, &V)> {
        self.order
            .iter()
            .filter_map(|(seq, key)| {
                let (key, values) = self.entries.get_key_value(key)?;
                values
                    .iter()
                    .find(|(live_seq, _)| live_seq == seq)
                    .map(|(_, value)| (key, value))
            })
            .collect()
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((seq, key)) = self.order.pop_front() {
            let Some(values) = self.entries.get_mut(&key) else {
                continue;
            };
            let Some(pos) = values.iter().position(|(live_seq, _)| *live_seq == seq) else {
                continue;
            };
            values.remove(pos);
            if values.is_empty() {
                self.entries.remove(&key);
            }
            self.len -= 1;
            return true;
        }
        false
    }

    fn maybe_compact(&mut self) {
        if self.order.len() > 2 * self.len + 16 {
            let entries = &self.entries;
            self.order.retain(|(seq, key)| {
                entries
                    .get(key)
                    .is_some_and(|values| values.iter().any(|(live_seq, _)| live_seq == seq))
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== BoundedCache Tests ==========

    #[test]
    fn insert_and_get() {
        let mut cache = BoundedCache::new(4);
        assert!(cache.insert("a", 1));
        assert_eq!(cache.get(&"a"), Some(&1));
        assert!(cache.contains_key(&"a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_existing_is_noop() {
        let mut cache = BoundedCache::new(4);
        cache.insert("a", 1);
        assert!(!cache.insert("a", 2));
        assert_eq!(cache.get(&"a"), Some(&1));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut cache = BoundedCache::new(3);
        cache.insert(1, "one");
        cache.insert(2, "two");
        cache.insert(3, "three");
        cache.insert(4, "four");
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains_key(&1));
        assert!(cache.contains_key(&4));
    }

    #[test]
    fn reinserting_does_not_refresh_position() {
        let mut cache = BoundedCache::new(2);
        cache.insert(1, ());
        cache.insert(2, ());
        cache.insert(1, ());
        cache.insert(3, ());
        assert!(!cache.contains_key(&1));
        assert!(cache.contains_key(&2));
    }

    #[test]
    fn removed_entries_are_not_evicted_twice() {
        let mut cache = BoundedCache::new(2);
        cache.insert(1, ());
        cache.insert(2, ());
        cache.remove(&1);
        cache.insert(1, ());
        cache.insert(3, ());
        // 2 is now oldest
        assert!(!cache.contains_key(&2));
        assert!(cache.contains_key(&1));
        assert!(cache.contains_key(&3));
    }

    #[test]
    fn retain_filters_entries() {
        let mut cache = BoundedCache::new(10);
        for i in 0..10 {
            cache.insert(i, i * 10);
        }
        cache.retain(|k, _| k % 2 == 0);
        assert_eq!(cache.len(), 5);
        assert!(cache.contains_key(&4));
        assert!(!cache.contains_key(&5));
    }

    #[test]
    fn entries_in_order_survive_rebuild() {
        let mut cache = BoundedCache::new(3);
        cache.insert("x", 1);
        cache.insert("y", 2);
        cache.insert("z", 3);
        cache.remove(&"y");
        let ordered: Vec<_> = cache.entries_in_order().into_iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(ordered, vec![("x", 1), ("z", 3)]);

        let mut rebuilt = BoundedCache::from_entries(3, ordered);
        rebuilt.insert("w", 4);
        rebuilt.insert("v", 5);
        assert!(!rebuilt.contains_key(&"x"));
        assert!(rebuilt.contains_key(&"z"));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut cache = BoundedCache::new(0);
        cache.insert(1, ());
        cache.insert(2, ());
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key(&2));
    }

    // ========== BoundedMultiCache Tests ==========

    #[test]
    fn multi_insert_distinct_values() {
        let mut cache = BoundedMultiCache::new(10);
        assert!(cache.insert("k", 1));
        assert!(cache.insert("k", 2));
        assert!(!cache.insert("k", 1));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_all(&"k").copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn multi_evicts_oldest_pair() {
        let mut cache = BoundedMultiCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_all(&"a").copied().collect::<Vec<_>>(), vec![3]);
        assert!(cache.contains_key(&"b"));
    }

    #[test]
    fn multi_remove_pair() {
        let mut cache = BoundedMultiCache::new(10);
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert!(cache.remove(&"a", &1));
        assert!(!cache.remove(&"a", &1));
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(&"a", &2));
        assert!(!cache.contains_key(&"a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn multi_retain_updates_len() {
        let mut cache = BoundedMultiCache::new(10);
        for i in 0..6 {
            cache.insert(i % 2, i);
        }
        cache.retain(|_, v| *v >= 3);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.keys().count(), 2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_exceeds_capacity(cap in 1usize..16, keys in prop::collection::vec(0u32..64, 0..200)) {
                let mut cache = BoundedCache::new(cap);
                for key in keys {
                    cache.insert(key, ());
                    prop_assert!(cache.len() <= cap);
                }
            }

            #[test]
            fn multi_never_exceeds_capacity(
                cap in 1usize..16,
                pairs in prop::collection::vec((0u8..8, 0u8..8), 0..200),
                removals in prop::collection::vec((0u8..8, 0u8..8), 0..50),
            ) {
                let mut cache = BoundedMultiCache::new(cap);
                for (k, v) in pairs {
                    cache.insert(k, v);
                    prop_assert!(cache.len() <= cap);
                }
                for (k, v) in removals {
                    cache.remove(&k, &v);
                }
                let counted: usize = cache.keys().map(|k| cache.get_all(k).count()).sum();
                prop_assert_eq!(counted, cache.len());
            }

            #[test]
            fn most_recent_insert_survives(cap in 1usize..16, keys in prop::collection::vec(0u32..1000, 1..100)) {
                let mut cache = BoundedCache::new(cap);
                let mut last = None;
                for key in keys {
                    if cache.insert(key, ()) {
                        last = Some(key);
                    }
                }
                if let Some(key) = last {
                    prop_assert!(cache.contains_key(&key));
                }
            }
        }
    }
}
