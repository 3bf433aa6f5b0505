//! Configuration for [`MemoryTree`](crate::MemoryTree).

use serde::{Deserialize, Serialize};

/// Configuration for an in-memory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryTreeConfig {
    /// Capacity of the change-notification channel. Subscribers that fall
    /// further behind than this observe a lag and must resync.
    pub event_capacity: usize,
    /// Session id stamped on ephemeral nodes.
    pub session_id: u64,
}

impl Default for MemoryTreeConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            session_id: 1,
        }
    }
}

impl MemoryTreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_session_id(mut self, session_id: u64) -> Self {
        self.session_id = session_id;
        self
    }
}
