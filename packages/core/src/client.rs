//! The remote tree surface.
//!
//! [`TreeClient`] is everything the cache and the modeled clients need from
//! a remote hierarchical store: plain node operations, all-or-nothing
//! transactions, and a change-notification stream for keeping a local
//! mirror in sync.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{CreateMode, Op, OpResult, Result, Stat, ZPath};

/// What happened to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeEventKind {
    Created,
    DataChanged,
    /// A child was added or removed; the node's own stat changed.
    ChildrenChanged,
    Deleted,
}

/// A change notification.
///
/// Events carry no payload. A subscriber that wants the new data reads the
/// node, which also means it can never see data the store has not committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEvent {
    pub kind: TreeEventKind,
    pub path: ZPath,
}

impl TreeEvent {
    pub fn new(kind: TreeEventKind, path: ZPath) -> Self {
        Self { kind, path }
    }
}

/// Async access to a remote, versioned key/value tree.
///
/// Version guards are `Option<i32>`: `None` matches any version.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn TreeClient>`.
#[async_trait]
pub trait TreeClient: Send + Sync {
    /// Create a node. With `create_parents`, missing ancestors are created
    /// empty first. Returns the created path and its stat.
    async fn create(
        &self,
        path: &ZPath,
        data: Bytes,
        mode: CreateMode,
        create_parents: bool,
    ) -> Result<(ZPath, Stat)>;

    /// Replace a node's data.
    async fn set_data(&self, path: &ZPath, data: Bytes, version: Option<i32>) -> Result<Stat>;

    /// Read a node's data and stat.
    async fn get_data(&self, path: &ZPath) -> Result<(Bytes, Stat)>;

    /// Delete a childless node.
    async fn delete(&self, path: &ZPath, version: Option<i32>) -> Result<()>;

    /// The node's stat, or `None` if it doesn't exist.
    async fn exists(&self, path: &ZPath) -> Result<Option<Stat>>;

    /// Names of the node's immediate children.
    async fn get_children(&self, path: &ZPath) -> Result<Vec<String>>;

    /// Apply all operations atomically, or none of them.
    async fn multi(&self, ops: Vec<Op>) -> Result<Vec<OpResult>>;

    /// Subscribe to change notifications for the whole tree.
    fn subscribe(&self) -> broadcast::Receiver<TreeEvent>;
}

// Blanket implementation for shared handles

#[async_trait]
impl<T: TreeClient + ?Sized> TreeClient for std::sync::Arc<T> {
    async fn create(
        &self,
        path: &ZPath,
        data: Bytes,
        mode: CreateMode,
        create_parents: bool,
    ) -> Result<(ZPath, Stat)> {
        self.as_ref().create(path, data, mode, create_parents).await
    }

    async fn set_data(&self, path: &ZPath, data: Bytes, version: Option<i32>) -> Result<Stat> {
        self.as_ref().set_data(path, data, version).await
    }

    async fn get_data(&self, path: &ZPath) -> Result<(Bytes, Stat)> {
        self.as_ref().get_data(path).await
    }

    async fn delete(&self, path: &ZPath, version: Option<i32>) -> Result<()> {
        self.as_ref().delete(path, version).await
    }

    async fn exists(&self, path: &ZPath) -> Result<Option<Stat>> {
        self.as_ref().exists(path).await
    }

    async fn get_children(&self, path: &ZPath) -> Result<Vec<String>> {
        self.as_ref().get_children(path).await
    }

    async fn multi(&self, ops: Vec<Op>) -> Result<Vec<OpResult>> {
        self.as_ref().multi(ops).await
    }

    fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.as_ref().subscribe()
    }
}
