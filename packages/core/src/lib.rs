//! Core types for a cached view of a remote hierarchical store.
//!
//! This layer is shared by the remote client, the cache and the facade:
//! - `ZPath`: Validated absolute node path
//! - `Stat`: Per-node version/modification stamp
//! - `AsyncStage`: Single-resolution async result, ready or pending
//! - `Op` / `OpResult`: Transaction descriptors and their outcomes
//! - `TreeClient`: The remote store surface, including change notifications
//!
//! # Example
//!
//! ```rust
//! use treecache_core::{AsyncStage, CachedNode, Stat, path};
//!
//! let node = CachedNode::new("payload", Stat::default());
//! let stage = AsyncStage::completed(node.model().to_string());
//! assert!(stage.is_done());
//! assert_eq!(path!("/a").child("b").unwrap().to_string(), "/a/b");
//! ```

pub use bytes::Bytes;

mod client;
mod error;
mod node;
mod op;
mod path;
mod path_trie;
mod stage;
mod stat;

pub use client::{TreeClient, TreeEvent, TreeEventKind};
pub use error::{Error, Result};
pub use node::CachedNode;
pub use op::{CreateMode, Op, OpResult, OpType};
pub use path::{PathError, ZPath};
pub use path_trie::PathTrie;
pub use stage::{AsyncStage, StageFuture};
pub use stat::Stat;
