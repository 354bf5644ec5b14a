//! Function memoization over an LRU cache
//!
//! Results are cached by argument tuple. Each memoized function owns its
//! own cache; there is no backing store.

use std::hash::Hash;

use lrustore::Result;

use crate::lru::LruCache;
use crate::stats::CacheStats;

/// Function wrapper that caches its most recent results
pub struct Memoize<A, R, F> {
    cache: LruCache<A, R>,
    func: F,
    stats: CacheStats,
}

impl<A, R, F> Memoize<A, R, F>
where
    A: Hash + Eq + Clone,
    R: Clone,
    F: FnMut(&A) -> R,
{
    /// Memoize `func`, keeping up to `capacity` results
    pub fn new(capacity: usize, func: F) -> Result<Self> {
        Ok(Self {
            cache: LruCache::new(capacity)?,
            func,
            stats: CacheStats::new(),
        })
    }

    /// Return the cached result for `args`, computing it on a miss
    pub fn call(&mut self, args: A) -> R {
        if let Some(result) = self.cache.get(&args) {
            self.stats.record_hit();
            return result.clone();
        }

        self.stats.record_miss();
        let result = (self.func)(&args);
        self.stats.record_insert();

        let stats = &self.stats;
        // The handler never fails, so neither does the insert
        let _ = self.cache.put_with(args, result.clone(), |_, _| {
            stats.record_eviction();
            Ok(())
        });
        result
    }

    /// Cached results, most recently used first
    pub fn cache(&self) -> &LruCache<A, R> {
        &self.cache
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Forget every cached result
    pub fn clear(&mut self) {
        self.cache.clear();
        self.stats.reset();
    }
}

/// Memoize `func` as a plain closure
///
/// # Returns
/// * `Err(Error::InvalidCapacity)` - `capacity` is zero
pub fn memoize<A, R, F>(capacity: usize, func: F) -> Result<impl FnMut(A) -> R>
where
    A: Hash + Eq + Clone,
    R: Clone,
    F: FnMut(&A) -> R,
{
    let mut memo = Memoize::new(capacity, func)?;
    Ok(move |args| memo.call(args))
}
