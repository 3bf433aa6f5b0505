//! Node metadata stamps.

use serde::{Deserialize, Serialize};

/// Version and modification metadata for one node.
///
/// Stamps are opaque to the cache: it stores whatever the remote store last
/// reported. Version guards are always checked by the remote store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction id that created the node.
    pub created_txn: i64,
    /// Transaction id that last modified the node's data.
    pub modified_txn: i64,
    /// Creation time, milliseconds since the Unix epoch.
    pub ctime: i64,
    /// Last modification time, milliseconds since the Unix epoch.
    pub mtime: i64,
    /// Number of data changes.
    pub version: i32,
    /// Number of child-list changes.
    pub cversion: i32,
    /// Owning session for ephemeral nodes, 0 otherwise.
    pub ephemeral_owner: u64,
    /// Payload length in bytes.
    pub data_length: u32,
    /// Number of immediate children.
    pub num_children: u32,
}

impl Stat {
    /// Overwrite every field with `other`'s.
    pub fn copy_from(&mut self, other: &Stat) {
        *self = *other;
    }

    /// Whether this stamp describes a newer data state than `other`.
    pub fn is_newer_than(&self, other: &Stat) -> bool {
        self.modified_txn > other.modified_txn
    }

    /// Whether the node is ephemeral.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}
