//! LRU (Least Recently Used) cache implementation
//!
//! Nodes live in an arena and are linked into a circular list anchored on a
//! sentinel at slot 0. The node after the sentinel is the most recently used
//! entry, the node before it the least recently used one. Every operation
//! touches the hash index and a constant number of links.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use ahash::RandomState;
use tracing::{debug, trace};

use lrustore::{Error, Result};

/// Arena slot of the list sentinel
const SENTINEL: usize = 0;

/// Callback invoked with each entry evicted for capacity reasons
pub type EvictionCallback<K, V> = Box<dyn FnMut(K, V) -> Result<()>>;

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    entry: Option<(K, V)>,
    prev: usize,
    next: usize,
}

impl<K, V> Node<K, V> {
    fn sentinel() -> Self {
        Self {
            entry: None,
            prev: SENTINEL,
            next: SENTINEL,
        }
    }
}

/// LRU cache with fixed capacity
///
/// Entries are evicted from the tail when an insert would exceed the
/// capacity or when the capacity is shrunk. Evicted entries are handed to the
/// registered [`EvictionCallback`], if any. Explicit removal and
/// [`clear`](Self::clear) never invoke it.
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Node<K, V>>,
    free_list: Vec<usize>,
    capacity: usize,
    callback: Option<EvictionCallback<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU cache with the given capacity
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` - `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        let mut nodes = Vec::with_capacity(capacity + 1);
        nodes.push(Node::sentinel());

        Ok(Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            nodes,
            free_list: Vec::new(),
            capacity,
            callback: None,
        })
    }

    /// Create a cache that reports evictions to `callback`
    pub fn with_callback<F>(capacity: usize, callback: F) -> Result<Self>
    where
        F: FnMut(K, V) -> Result<()> + 'static,
    {
        let mut cache = Self::new(capacity)?;
        cache.set_callback(callback);
        Ok(cache)
    }

    /// Register the eviction callback, replacing any previous one
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(K, V) -> Result<()> + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Detach and return the eviction callback
    pub fn take_callback(&mut self) -> Option<EvictionCallback<K, V>> {
        self.callback.take()
    }

    /// Get a value and mark it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.value(idx)
    }

    /// Get a value without touching the recency order
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.value(idx)
    }

    /// Check for a key without touching the recency order
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Least recently used entry, without touching the recency order
    pub fn peek_lru(&self) -> Option<(&K, &V)> {
        self.nodes[self.nodes[SENTINEL].prev]
            .entry
            .as_ref()
            .map(|(k, v)| (k, v))
    }

    /// Insert a key-value pair and mark it most recently used
    ///
    /// Inserting a new key into a full cache evicts the least recently used
    /// entry first. The insert completes even if the eviction callback
    /// fails; its error is returned afterwards.
    pub fn put(&mut self, key: K, value: V) -> Result<()> {
        let mut callback = self.callback.take();
        let result = self.insert(key, value, |k, v| match callback.as_mut() {
            Some(f) => f(k, v),
            None => Ok(()),
        });
        self.callback = callback;
        result
    }

    /// Like [`put`](Self::put), but evictions go to `on_evict` instead of
    /// the registered callback
    pub fn put_with<F>(&mut self, key: K, value: V, on_evict: F) -> Result<()>
    where
        F: FnMut(K, V) -> Result<()>,
    {
        self.insert(key, value, on_evict)
    }

    /// Remove a key from the cache
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free_list.push(idx);
        self.nodes[idx].entry.take().map(|(_, value)| value)
    }

    /// Remove a key, failing if it is absent
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - Key is not cached
    pub fn delete(&mut self, key: &K) -> Result<V> {
        self.remove(key).ok_or(Error::NotFound)
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity, evicting from the tail as needed
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` - `capacity` is zero; nothing changes
    /// * `Err(_)` - First error raised by the eviction callback. All
    ///   required evictions still happen and the new capacity is applied.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        let mut callback = self.callback.take();
        let result = self.resize_with(capacity, |k, v| match callback.as_mut() {
            Some(f) => f(k, v),
            None => Ok(()),
        });
        self.callback = callback;
        result
    }

    /// Like [`resize`](Self::resize), but evictions go to `on_evict` instead
    /// of the registered callback
    pub fn resize_with<F>(&mut self, capacity: usize, mut on_evict: F) -> Result<()>
    where
        F: FnMut(K, V) -> Result<()>,
    {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        let before = self.map.len();
        let mut result = Ok(());
        while self.map.len() > capacity {
            let Some((key, value)) = self.evict() else {
                break;
            };
            let outcome = on_evict(key, value);
            if result.is_ok() {
                result = outcome;
            }
        }

        debug!(
            from = self.capacity,
            to = capacity,
            evicted = before - self.map.len(),
            "resized cache"
        );
        self.capacity = capacity;
        result
    }

    /// Get the current size of the cache
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Clear the cache without invoking the eviction callback
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.truncate(1);
        self.nodes[SENTINEL] = Node::sentinel();
        self.free_list.clear();
    }

    /// Iterate `(key, value)` pairs from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            cursor: self.nodes[SENTINEL].next,
            remaining: self.map.len(),
        }
    }

    /// Alias of [`iter`](Self::iter)
    pub fn items(&self) -> Iter<'_, K, V> {
        self.iter()
    }

    /// Iterate keys from most to least recently used
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Iterate values from most to least recently used
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Visit every entry from most to least recently used with mutable
    /// access to the value, stopping at the first error
    pub fn try_for_each_mut<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&K, &mut V) -> Result<()>,
    {
        let mut cursor = self.nodes[SENTINEL].next;
        while cursor != SENTINEL {
            let node = &mut self.nodes[cursor];
            if let Some((key, value)) = node.entry.as_mut() {
                f(&*key, value)?;
            }
            cursor = node.next;
        }
        Ok(())
    }

    fn insert<F>(&mut self, key: K, value: V, mut on_evict: F) -> Result<()>
    where
        F: FnMut(K, V) -> Result<()>,
    {
        if let Some(&idx) = self.map.get(&key) {
            // Update existing
            if let Some((_, slot)) = self.nodes[idx].entry.as_mut() {
                *slot = value;
            }
            self.move_to_front(idx);
            return Ok(());
        }

        let mut result = Ok(());
        if self.map.len() >= self.capacity {
            if let Some((old_key, old_value)) = self.evict() {
                result = on_evict(old_key, old_value);
            }
        }

        let idx = self.alloc_node(key.clone(), value);
        self.link_front(idx);
        self.map.insert(key, idx);
        result
    }

    fn value(&self, idx: usize) -> Option<&V> {
        self.nodes[idx].entry.as_ref().map(|(_, value)| value)
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.nodes[SENTINEL].next == idx {
            return; // Already at front
        }

        self.unlink(idx);
        self.link_front(idx);
    }

    fn link_front(&mut self, idx: usize) {
        let first = self.nodes[SENTINEL].next;
        self.nodes[idx].prev = SENTINEL;
        self.nodes[idx].next = first;
        self.nodes[first].prev = idx;
        self.nodes[SENTINEL].next = idx;
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    /// Detach the tail entry; the index and list are consistent on return
    fn evict(&mut self) -> Option<(K, V)> {
        let tail = self.nodes[SENTINEL].prev;
        if tail == SENTINEL {
            return None;
        }

        self.unlink(tail);
        self.free_list.push(tail);
        let (key, value) = self.nodes[tail].entry.take()?;
        self.map.remove(&key);
        trace!(len = self.map.len(), "evicted least recently used entry");
        Some((key, value))
    }

    fn alloc_node(&mut self, key: K, value: V) -> usize {
        let node = Node {
            entry: Some((key, value)),
            prev: SENTINEL,
            next: SENTINEL,
        };

        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx] = node;
            idx
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }
}

impl<K, V> fmt::Debug for LruCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("entries", &DebugEntries(self))
            .finish()
    }
}

struct DebugEntries<'a, K, V>(&'a LruCache<K, V>);

impl<K, V> fmt::Debug for DebugEntries<'_, K, V>
where
    K: Hash + Eq + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// Iterator over `(key, value)` pairs, most recently used first
pub struct Iter<'a, K, V> {
    nodes: &'a [Node<K, V>],
    cursor: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = &self.nodes[self.cursor];
        self.cursor = node.next;
        self.remaining -= 1;
        node.entry.as_ref().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Iterator over keys, most recently used first
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// Iterator over values, most recently used first
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

impl<'a, K, V> IntoIterator for &'a LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    type Item = &'a K;
    type IntoIter = Keys<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Evicted = Rc<RefCell<Vec<(i32, &'static str)>>>;

    fn recording_cache(capacity: usize) -> (LruCache<i32, &'static str>, Evicted) {
        let evicted: Evicted = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&evicted);
        let cache = LruCache::with_callback(capacity, move |k: i32, v: &'static str| {
            sink.borrow_mut().push((k, v));
            Ok(())
        })
        .unwrap();
        (cache, evicted)
    }

    fn keys(cache: &LruCache<i32, &'static str>) -> Vec<i32> {
        cache.keys().copied().collect()
    }

    #[test]
    fn test_lru_basic() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();

        assert_eq!(cache.get(&1), Some(&"a"));
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_zero_capacity() {
        assert!(matches!(
            LruCache::<i32, i32>::new(0),
            Err(Error::InvalidCapacity(0))
        ));
    }

    #[test]
    fn test_lru_eviction() {
        let (mut cache, evicted) = recording_cache(2);

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.put(3, "c").unwrap(); // Should evict 1

        assert_eq!(*evicted.borrow(), vec![(1, "a")]);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(&"b"));
        assert_eq!(cache.get(&3), Some(&"c"));
    }

    #[test]
    fn test_lru_update() {
        let (mut cache, evicted) = recording_cache(2);

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.get(&1); // Move 1 to front
        cache.put(3, "c").unwrap(); // Should evict 2

        assert_eq!(*evicted.borrow(), vec![(2, "b")]);
        assert_eq!(keys(&cache), vec![3, 1]);
    }

    #[test]
    fn test_lru_put_existing_moves_to_front() {
        let (mut cache, evicted) = recording_cache(3);

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.put(3, "c").unwrap();
        cache.put(1, "a").unwrap();

        assert_eq!(keys(&cache), vec![1, 3, 2]);
        assert!(evicted.borrow().is_empty());
    }

    #[test]
    fn test_lru_peek_and_contains_keep_order() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.put(3, "c").unwrap();

        assert_eq!(cache.peek(&1), Some(&"a"));
        assert!(cache.contains(&2));
        assert!(!cache.contains(&9));
        assert_eq!(cache.peek_lru(), Some((&1, &"a")));
        assert_eq!(keys(&cache), vec![3, 2, 1]);
    }

    #[test]
    fn test_lru_remove() {
        let (mut cache, evicted) = recording_cache(3);

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.put(3, "c").unwrap();

        assert_eq!(cache.remove(&2), Some("b"));
        assert_eq!(cache.remove(&2), None);
        assert!(cache.delete(&2).unwrap_err().is_not_found());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&2), None);
        assert_eq!(keys(&cache), vec![3, 1]);
        assert!(evicted.borrow().is_empty());
    }

    #[test]
    fn test_lru_reuses_freed_slots() {
        let mut cache = LruCache::new(2).unwrap();

        for i in 0..100 {
            cache.put(i, "x").unwrap();
            if i % 3 == 0 {
                cache.remove(&i);
            }
        }

        assert!(cache.nodes.len() <= 3);
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_lru_clear() {
        let (mut cache, evicted) = recording_cache(3);

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.clear();

        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert!(evicted.borrow().is_empty());

        cache.put(4, "d").unwrap();
        assert_eq!(keys(&cache), vec![4]);
    }

    #[test]
    fn test_lru_overwrite() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, "a").unwrap();
        cache.put(1, "b").unwrap(); // Overwrite

        assert_eq!(cache.get(&1), Some(&"b"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_resize_down() {
        let (mut cache, evicted) = recording_cache(4);

        for (k, v) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            cache.put(k, v).unwrap();
        }
        cache.resize(1).unwrap();

        assert_eq!(cache.capacity(), 1);
        assert_eq!(*evicted.borrow(), vec![(1, "a"), (2, "b"), (3, "c")]);
        assert_eq!(keys(&cache), vec![4]);
    }

    #[test]
    fn test_lru_resize_up_keeps_entries() {
        let (mut cache, evicted) = recording_cache(2);

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.resize(3).unwrap();
        cache.put(3, "c").unwrap();

        assert_eq!(cache.len(), 3);
        assert!(evicted.borrow().is_empty());
    }

    #[test]
    fn test_lru_resize_zero_is_rejected() {
        let mut cache = LruCache::new(2).unwrap();
        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();

        assert!(matches!(cache.resize(0), Err(Error::InvalidCapacity(0))));
        assert_eq!(cache.capacity(), 2);
        assert_eq!(keys(&cache), vec![2, 1]);
    }

    #[test]
    fn test_lru_callback_error_still_inserts() {
        let mut cache = LruCache::with_callback(1, |_k: i32, _v: &'static str| {
            Err(Error::backend("callback refused"))
        })
        .unwrap();

        cache.put(1, "a").unwrap();
        let err = cache.put(2, "b").unwrap_err();

        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&2), Some(&"b"));
        assert!(!cache.contains(&1));
    }

    #[test]
    fn test_lru_resize_callback_error_finishes_eviction() {
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let mut cache = LruCache::with_callback(3, move |_k: i32, _v: i32| {
            *counter.borrow_mut() += 1;
            Err(Error::backend("nope"))
        })
        .unwrap();

        for i in 0..3 {
            cache.put(i, i).unwrap();
        }

        assert!(cache.resize(1).is_err());
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_lru_put_with_overrides_callback() {
        let (mut cache, evicted) = recording_cache(1);
        let mut local = Vec::new();

        cache.put(1, "a").unwrap();
        cache
            .put_with(2, "b", |k, v| {
                local.push((k, v));
                Ok(())
            })
            .unwrap();

        assert_eq!(local, vec![(1, "a")]);
        assert!(evicted.borrow().is_empty());
    }

    #[test]
    fn test_lru_take_callback() {
        let (mut cache, evicted) = recording_cache(1);

        assert!(cache.take_callback().is_some());
        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();

        assert!(evicted.borrow().is_empty());
    }

    #[test]
    fn test_lru_iteration_order() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(1, "a").unwrap();
        cache.put(2, "b").unwrap();
        cache.put(3, "c").unwrap();
        cache.get(&2);

        let items: Vec<_> = cache.items().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(items, vec![(2, "b"), (3, "c"), (1, "a")]);

        let values: Vec<_> = cache.values().copied().collect();
        assert_eq!(values, vec!["b", "c", "a"]);

        let direct: Vec<_> = (&cache).into_iter().copied().collect();
        assert_eq!(direct, vec![2, 3, 1]);
        assert_eq!(cache.keys().len(), 3);
    }

    #[test]
    fn test_lru_try_for_each_mut() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(1, 10).unwrap();
        cache.put(2, 20).unwrap();

        cache
            .try_for_each_mut(|_, v| {
                *v += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(cache.peek(&1), Some(&11));

        let mut seen = 0;
        let result = cache.try_for_each_mut(|_, _| {
            seen += 1;
            Err(Error::NotFound)
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_lru_debug() {
        let mut cache = LruCache::new(2).unwrap();
        cache.put(1, "a").unwrap();

        let rendered = format!("{:?}", cache);
        assert!(rendered.contains("capacity: 2"));
        assert!(rendered.contains("1: \"a\""));
    }
}
