//! Caching proxy in front of a backing [`Store`]
//!
//! Under [`WritePolicy::Through`] every mutation reaches the store before the
//! cache, so the two never disagree. Under [`WritePolicy::Back`] mutations
//! stay in the cache marked dirty and reach the store on eviction,
//! [`Wrap::sync`], [`Wrap::flush`], [`Wrap::close`] or drop.
//!
//! A dirty entry whose write fails during eviction has already left the
//! cache. It is parked in a pending buffer that reads still see and that the
//! next [`Wrap::sync`] retries first, so a failed write never loses data.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use ahash::RandomState;
use thiserror::Error;
use tracing::{debug, trace, warn};

use lrustore::{Error, Result, Store};

use crate::lru::LruCache;
use crate::stats::CacheStats;

/// How mutations propagate from the cache to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WritePolicy {
    /// Mirror every mutation to the store immediately
    #[default]
    Through,
    /// Buffer mutations in the cache until eviction or sync
    Back,
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePolicy::Through => f.write_str("write-through"),
            WritePolicy::Back => f.write_str("write-back"),
        }
    }
}

/// Unrecognized write policy name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown write policy: {0:?} (expected \"through\" or \"back\")")]
pub struct ParsePolicyError(String);

impl FromStr for WritePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "through" | "write-through" | "writethrough" => Ok(WritePolicy::Through),
            "back" | "write-back" | "writeback" => Ok(WritePolicy::Back),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// Cached value plus its write-back state
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    dirty: bool,
}

type Pending<K, V> = HashMap<K, V, RandomState>;

/// LRU cache wrapped around a backing store
pub struct Wrap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: Store<K, V>,
{
    /// Backing store
    store: S,

    /// Recently used entries
    cache: LruCache<K, Entry<V>>,

    /// Evicted dirty entries whose write-back failed
    pending: Pending<K, V>,

    policy: WritePolicy,

    /// Cache statistics
    stats: CacheStats,

    /// Set once `close` has run its final sync
    closed: bool,
}

impl<K, V, S> Wrap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: Store<K, V>,
{
    /// Wrap `store` with a cache of `capacity` entries
    ///
    /// # Returns
    /// * `Err(Error::InvalidCapacity)` - `capacity` is zero
    pub fn new(store: S, capacity: usize, policy: WritePolicy) -> Result<Self> {
        Ok(Self {
            store,
            cache: LruCache::new(capacity)?,
            pending: HashMap::with_hasher(RandomState::new()),
            policy,
            stats: CacheStats::new(),
            closed: false,
        })
    }

    /// Wrap `store` in write-through mode
    pub fn write_through(store: S, capacity: usize) -> Result<Self> {
        Self::new(store, capacity, WritePolicy::Through)
    }

    /// Wrap `store` in write-back mode
    pub fn write_back(store: S, capacity: usize) -> Result<Self> {
        Self::new(store, capacity, WritePolicy::Back)
    }

    /// Get a value from cache or store
    ///
    /// A miss loads the value into the cache, which may evict (and, in
    /// write-back mode, write out) the least recently used entry. An error
    /// from that write is returned even though the load succeeded.
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - Key is in neither the cache nor the store
    pub fn get(&mut self, key: &K) -> Result<V> {
        if let Some(entry) = self.cache.get(key) {
            self.stats.record_hit();
            return Ok(entry.value.clone());
        }

        self.stats.record_miss();

        // Parked entries are newer than the store
        if let Some(value) = self.pending.remove(key) {
            self.insert(key.clone(), value.clone(), true)?;
            return Ok(value);
        }

        let value = self.store.get(key)?;
        self.insert(key.clone(), value.clone(), false)?;
        Ok(value)
    }

    /// Look a value up without reordering the cache or loading it
    pub fn peek(&self, key: &K) -> Result<V> {
        if let Some(entry) = self.cache.peek(key) {
            return Ok(entry.value.clone());
        }
        if let Some(value) = self.pending.get(key) {
            return Ok(value.clone());
        }
        self.store.get(key)
    }

    /// Check whether `key` exists in the cache or the store
    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains(key) || self.pending.contains_key(key) || self.store.contains(key)
    }

    /// Put a value into the cache, and into the store in write-through mode
    ///
    /// In write-through mode the store is written first; if that fails the
    /// cache is left untouched.
    pub fn put(&mut self, key: K, value: V) -> Result<()> {
        match self.policy {
            WritePolicy::Through => {
                self.store.set(key.clone(), value.clone())?;
                self.insert(key, value, false)
            }
            WritePolicy::Back => {
                self.pending.remove(&key);
                self.insert(key, value, true)
            }
        }
    }

    /// Delete a value from cache and store
    ///
    /// In write-back mode an unflushed write for `key` is discarded and the
    /// deletion still reaches the store, so a later miss cannot resurrect an
    /// older stored value.
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` - Key is in neither the cache nor the store
    pub fn delete(&mut self, key: &K) -> Result<()> {
        match self.policy {
            WritePolicy::Through => {
                self.cache.remove(key);
                self.store.delete(key)
            }
            WritePolicy::Back => {
                let cached = self.cache.remove(key).is_some();
                let parked = self.pending.remove(key).is_some();
                match self.store.delete(key) {
                    Err(Error::NotFound) if cached || parked => Ok(()),
                    result => result,
                }
            }
        }
    }

    /// Write every dirty entry to the store
    ///
    /// Parked entries go first, then cached entries from most to least
    /// recently used. The first store error stops the sync; that entry and
    /// everything not yet visited stay dirty for the next attempt. No-op in
    /// write-through mode.
    pub fn sync(&mut self) -> Result<()> {
        if self.policy == WritePolicy::Through {
            return Ok(());
        }

        let mut written = 0usize;
        let mut failure = None;
        self.pending.retain(|key, value| {
            if failure.is_some() {
                return true;
            }
            match self.store.set(key.clone(), value.clone()) {
                Ok(()) => {
                    self.stats.record_writeback();
                    written += 1;
                    false
                }
                Err(err) => {
                    failure = Some(err);
                    true
                }
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }

        self.cache.try_for_each_mut(|key, entry| {
            if entry.dirty {
                self.store.set(key.clone(), entry.value.clone())?;
                entry.dirty = false;
                self.stats.record_writeback();
                written += 1;
            }
            Ok(())
        })?;

        debug!(written, "synced dirty entries");
        Ok(())
    }

    /// Sync, then empty the cache
    ///
    /// If the sync fails the cache is left as it was.
    pub fn flush(&mut self) -> Result<()> {
        self.sync()?;
        self.cache.clear();
        debug!("flushed cache");
        Ok(())
    }

    /// Clear cache and store
    ///
    /// Unflushed writes are discarded rather than written, since their
    /// destination is being emptied.
    pub fn clear(&mut self) -> Result<()> {
        self.cache.clear();
        self.pending.clear();
        self.stats.reset();
        self.store.clear()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Change the cache capacity
    ///
    /// Shrinking evicts from the least recently used end; in write-back mode
    /// evicted dirty entries are written to the store.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        self.cache.resize_with(
            capacity,
            evict_handler(&mut self.store, &mut self.pending, &self.stats),
        )
    }

    /// Get current cache size
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of writes not yet in the store
    pub fn dirty_len(&self) -> usize {
        self.cache.values().filter(|entry| entry.dirty).count() + self.pending.len()
    }

    /// Number of keys in the store as it would be after a sync
    pub fn len(&self) -> usize {
        match self.policy {
            WritePolicy::Through => self.store.len(),
            WritePolicy::Back => {
                let stored = self
                    .store
                    .keys()
                    .filter(|key| !self.is_unflushed(key))
                    .count();
                self.dirty_len() + stored
            }
        }
    }

    /// Check if the wrapped store (plus unflushed writes) is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All `(key, value)` pairs, in no particular order
    ///
    /// Write-through mode reads the store directly. Write-back mode yields
    /// unflushed values first, then stored values for every other key.
    pub fn items(&self) -> Box<dyn Iterator<Item = (K, V)> + '_> {
        match self.policy {
            WritePolicy::Through => self.store.items(),
            WritePolicy::Back => {
                let dirty = self
                    .cache
                    .iter()
                    .filter(|(_, entry)| entry.dirty)
                    .map(|(key, entry)| (key.clone(), entry.value.clone()));
                let parked = self.pending.iter().map(|(k, v)| (k.clone(), v.clone()));
                let stored = self
                    .store
                    .items()
                    .filter(move |(key, _)| !self.is_unflushed(key));
                Box::new(dirty.chain(parked).chain(stored))
            }
        }
    }

    /// All keys, in no particular order
    pub fn keys(&self) -> Box<dyn Iterator<Item = K> + '_> {
        match self.policy {
            WritePolicy::Through => self.store.keys(),
            WritePolicy::Back => {
                let dirty = self
                    .cache
                    .iter()
                    .filter(|(_, entry)| entry.dirty)
                    .map(|(key, _)| key.clone());
                let parked = self.pending.keys().cloned();
                let stored = self
                    .store
                    .keys()
                    .filter(move |key| !self.is_unflushed(key));
                Box::new(dirty.chain(parked).chain(stored))
            }
        }
    }

    /// All values, in no particular order
    pub fn values(&self) -> Box<dyn Iterator<Item = V> + '_> {
        match self.policy {
            WritePolicy::Through => self.store.values(),
            WritePolicy::Back => Box::new(self.items().map(|(_, value)| value)),
        }
    }

    /// Run `f` against this proxy, then sync
    ///
    /// The sync runs whether or not `f` fails. An error from `f` takes
    /// precedence over an error from the sync.
    pub fn scope<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let outcome = f(self);
        let synced = self.sync();
        match outcome {
            Ok(value) => synced.map(|()| value),
            Err(err) => {
                if let Err(sync_err) = synced {
                    warn!(error = %sync_err, "sync after failed scope also failed");
                }
                Err(err)
            }
        }
    }

    /// Sync and release the proxy, reporting any sync error
    pub fn close(mut self) -> Result<()> {
        let result = self.sync();
        self.closed = true;
        result
    }

    /// Write policy in effect
    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Borrow the backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn is_unflushed(&self, key: &K) -> bool {
        self.pending.contains_key(key) || self.cache.peek(key).is_some_and(|entry| entry.dirty)
    }

    fn insert(&mut self, key: K, value: V, dirty: bool) -> Result<()> {
        self.stats.record_insert();
        self.cache.put_with(
            key,
            Entry { value, dirty },
            evict_handler(&mut self.store, &mut self.pending, &self.stats),
        )
    }
}

/// Eviction path: clean entries are dropped, dirty ones written to `store`
fn evict_handler<'a, K, V, S>(
    store: &'a mut S,
    pending: &'a mut Pending<K, V>,
    stats: &'a CacheStats,
) -> impl FnMut(K, Entry<V>) -> Result<()> + 'a
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: Store<K, V>,
{
    move |key, entry| {
        stats.record_eviction();
        if !entry.dirty {
            return Ok(());
        }

        match store.set(key.clone(), entry.value.clone()) {
            Ok(()) => {
                stats.record_writeback();
                trace!("wrote back evicted entry");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "write-back of evicted entry failed, parking it for the next sync");
                pending.insert(key, entry.value);
                Err(err)
            }
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a Wrap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: Store<K, V>,
{
    type Item = K;
    type IntoIter = Box<dyn Iterator<Item = K> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys()
    }
}

impl<K, V, S> Drop for Wrap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: Store<K, V>,
{
    fn drop(&mut self) {
        if self.closed || self.policy == WritePolicy::Through {
            return;
        }
        if let Err(err) = self.sync() {
            warn!(error = %err, dirty = self.dirty_len(), "sync on drop failed, unflushed writes lost");
        }
    }
}
