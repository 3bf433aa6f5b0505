//! Typed, cached access to a versioned hierarchical key/value tree.
//!
//! This crate ties the layers together:
//! - [`ModeledClient`]: typed reads and writes against the remote store
//! - [`CachedModeledClient`]: the same surface with reads served from a
//!   shared [`ModeledCache`] kept in sync in the background
//!
//! The lower layers are re-exported, so most users only depend on this crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use treecache::{path, CreateOption, MemoryTree, ModelSpec, ModeledClient, TreeClient};
//!
//! let tree: Arc<dyn TreeClient> = Arc::new(MemoryTree::new());
//! let spec = ModelSpec::<String>::json(path!("/greetings"))
//!     .with_create_option(CreateOption::CreateParentsIfNeeded);
//!
//! let greetings = ModeledClient::new(tree, spec).cached();
//! greetings.start()?;
//!
//! let hello = greetings.at("hello")?;
//! hello.set(&"world".to_string()).await?;
//!
//! // Uncached: always sees the write.
//! assert_eq!(hello.client().read().await?, "world");
//! ```

mod cached;
mod modeled;

pub use cached::CachedModeledClient;
pub use modeled::ModeledClient;

pub use treecache_cache::{CacheConfig, ModeledCache, ModeledCacheEvent, ModeledCacheListener};
pub use treecache_core::{
    path, AsyncStage, Bytes, CachedNode, CreateMode, Error, Op, OpResult, OpType, PathError,
    Result, Stat, TreeClient, TreeEvent, TreeEventKind, ZPath,
};
pub use treecache_memory::{MemoryTree, MemoryTreeConfig};
pub use treecache_serde::{CreateOption, DeleteOption, JsonModelSerializer, ModelSerializer, ModelSpec};
