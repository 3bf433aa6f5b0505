//! Cached node snapshots.

use crate::stat::Stat;

/// An immutable (model, stat) pair as last observed for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedNode<T> {
    model: T,
    stat: Stat,
}

impl<T> CachedNode<T> {
    pub fn new(model: T, stat: Stat) -> Self {
        Self { model, stat }
    }

    /// The deserialized payload.
    pub fn model(&self) -> &T {
        &self.model
    }

    /// The metadata stamp.
    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    pub fn into_parts(self) -> (T, Stat) {
        (self.model, self.stat)
    }
}
