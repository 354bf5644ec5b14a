//! In-process store backed by a hash map

use std::collections::HashMap;
use std::hash::Hash;
use ahash::RandomState;

use crate::error::{Error, Result};
use crate::store::Store;

/// Hash-map store using AHash
#[derive(Debug, Clone)]
pub struct MemoryStore<K, V> {
    map: HashMap<K, V, RandomState>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Hash + Eq,
{
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Create an empty store with room for `capacity` keys
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
        }
    }

    /// Borrow the value under `key` without cloning
    pub fn get_ref(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for MemoryStore<K, V>
where
    K: Hash + Eq,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

impl<K, V> Extend<(K, V)> for MemoryStore<K, V>
where
    K: Hash + Eq,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.map.extend(iter);
    }
}

impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn get(&self, key: &K) -> Result<V> {
        self.map.get(key).cloned().ok_or(Error::NotFound)
    }

    fn set(&mut self, key: K, value: V) -> Result<()> {
        self.map.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &K) -> Result<()> {
        self.map.remove(key).map(|_| ()).ok_or(Error::NotFound)
    }

    fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) -> Result<()> {
        self.map.clear();
        Ok(())
    }

    fn items(&self) -> Box<dyn Iterator<Item = (K, V)> + '_> {
        Box::new(self.map.iter().map(|(k, v)| (k.clone(), v.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_basic() {
        let mut store = MemoryStore::new();

        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();

        assert_eq!(store.get(&"a").unwrap(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.contains(&"b"));
    }

    #[test]
    fn test_store_missing() {
        let mut store: MemoryStore<&str, i32> = MemoryStore::new();

        assert!(store.get(&"nope").unwrap_err().is_not_found());
        assert!(store.delete(&"nope").unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_overwrite_and_delete() {
        let mut store = MemoryStore::new();

        store.set(1, "x").unwrap();
        store.set(1, "y").unwrap();
        assert_eq!(store.get_ref(&1), Some(&"y"));

        store.delete(&1).unwrap();
        assert!(!store.contains(&1));
    }

    #[test]
    fn test_store_iteration() {
        let store: MemoryStore<i32, i32> = (0..5).map(|i| (i, i * 10)).collect();

        let mut keys: Vec<_> = store.keys().collect();
        keys.sort();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);

        let total: i32 = store.values().sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_store_borrowed_iteration() {
        fn sorted_keys<S: Store<u8, String>>(store: &S) -> Vec<u8> {
            let mut keys: Vec<_> = store.keys().collect();
            keys.sort();
            keys
        }

        let mut owned: MemoryStore<u8, String> =
            [(2, "b".to_string()), (1, "a".to_string())].into_iter().collect();
        let borrowed = &mut owned;

        assert_eq!(sorted_keys(&borrowed), vec![1, 2]);
        let mut values: Vec<_> = borrowed.values().collect();
        values.sort();
        assert_eq!(values, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_store_clear() {
        let mut store: MemoryStore<i32, i32> = (0..3).map(|i| (i, i)).collect();
        store.clear().unwrap();
        assert_eq!(store.len(), 0);
    }
}
