//! Rollgate store: watch-fed object cache and the reconcile work queue.

#![forbid(unsafe_code)]

pub mod cache;
pub mod queue;

pub use cache::{controller_owner, key_of, spawn_cache, CacheBuilder, CacheReader, CacheSnapshot, Change, Delta, FetchError, OwnerKey};
pub use queue::WorkQueue;
