//! # lrucache
//!
//! Constant-time LRU cache, plus a caching proxy for key/value stores.
//!
//! ## Architecture
//! - **HashMap**: AHash index from key to arena slot (O(1))
//! - **LRU List**: circular doubly-linked list over the arena, anchored on a
//!   sentinel (O(1) reorder and eviction)
//! - **Wrap**: write-through or write-back proxy over any [`Store`]
//! - **Memoize**: per-function result cache keyed by argument tuple
//!
//! Nothing here is thread-safe; every type expects a single owner.

#![warn(missing_docs)]

mod lru;
mod memo;
mod stats;
mod wrap;

pub use lru::{EvictionCallback, Iter, Keys, LruCache, Values};
pub use lrustore::{Error, MemoryStore, Result, Store};
pub use memo::{memoize, Memoize};
pub use stats::{CacheStats, StatsSnapshot};
pub use wrap::{ParsePolicyError, WritePolicy, Wrap};
