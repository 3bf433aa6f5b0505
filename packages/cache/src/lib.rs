//! Hierarchical modeled cache.
//!
//! [`ModeledCache`] mirrors a subtree of a [`TreeClient`](treecache_core::TreeClient)
//! in memory, decoded into models. A background sync task owns all writes to
//! the cache; readers only ever take snapshots.
//!
//! - [`CacheConfig`] - initial load, depth limit, lag handling
//! - [`ModeledCacheListener`] - change notifications

mod cache;
mod config;
mod listener;
mod node_map;

pub use cache::ModeledCache;
pub use config::CacheConfig;
pub use listener::{ModeledCacheEvent, ModeledCacheListener};
