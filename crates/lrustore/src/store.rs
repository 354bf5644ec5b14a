//! Backing-store contract
//!
//! The proxy treats the store as opaque: it never assumes anything about
//! ordering, latency or failure behavior beyond what these methods return.

use crate::error::Result;

/// Key/value service sitting behind a caching proxy
pub trait Store<K, V> {
    /// Fetch the value stored under `key`
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - Key is absent
    fn get(&self, key: &K) -> Result<V>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&mut self, key: K, value: V) -> Result<()>;

    /// Remove `key`
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - Key is absent
    fn delete(&mut self, key: &K) -> Result<()>;

    /// Membership test
    fn contains(&self, key: &K) -> bool;

    /// Number of stored keys
    fn len(&self) -> usize;

    /// Check if the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key
    fn clear(&mut self) -> Result<()>;

    /// All `(key, value)` pairs, in no particular order
    fn items(&self) -> Box<dyn Iterator<Item = (K, V)> + '_>;

    /// All keys, in no particular order
    fn keys<'a>(&'a self) -> Box<dyn Iterator<Item = K> + 'a>
    where
        K: 'a,
        V: 'a,
    {
        Box::new(self.items().map(|(key, _)| key))
    }

    /// All values, in no particular order
    fn values<'a>(&'a self) -> Box<dyn Iterator<Item = V> + 'a>
    where
        K: 'a,
        V: 'a,
    {
        Box::new(self.items().map(|(_, value)| value))
    }
}

impl<K, V, T> Store<K, V> for &mut T
where
    T: Store<K, V> + ?Sized,
{
    fn get(&self, key: &K) -> Result<V> {
        (**self).get(key)
    }

    fn set(&mut self, key: K, value: V) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&mut self, key: &K) -> Result<()> {
        (**self).delete(key)
    }

    fn contains(&self, key: &K) -> bool {
        (**self).contains(key)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn items(&self) -> Box<dyn Iterator<Item = (K, V)> + '_> {
        (**self).items()
    }

    fn keys<'a>(&'a self) -> Box<dyn Iterator<Item = K> + 'a>
    where
        K: 'a,
        V: 'a,
    {
        (**self).keys()
    }

    fn values<'a>(&'a self) -> Box<dyn Iterator<Item = V> + 'a>
    where
        K: 'a,
        V: 'a,
    {
        (**self).values()
    }
}
