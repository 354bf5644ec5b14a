//! # lrustore
//!
//! Backing-store contract for the `lrucache` proxy.
//!
//! ## Contents
//! - **Store**: key/value trait the proxy reads from and writes to
//! - **MemoryStore**: AHash-backed in-process store
//! - **Error**: error type shared by the store, the cache and the proxy

#![warn(missing_docs)]

mod error;
mod memory;
mod store;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use store::Store;
