//! Cache change listeners.

use treecache_core::{CachedNode, Error, ZPath};

/// The kind of change a listener is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeledCacheEvent {
    NodeAdded,
    NodeUpdated,
    NodeRemoved,
}

/// Observes changes applied to a [`ModeledCache`](crate::ModeledCache).
///
/// Callbacks run on the cache's sync task, after the change is visible to
/// readers. Keep them short.
pub trait ModeledCacheListener<T>: Send + Sync {
    /// A node was added, updated or removed. For removals `node` is the
    /// last cached snapshot.
    fn accept(&self, event: ModeledCacheEvent, path: &ZPath, node: &CachedNode<T>);

    /// The initial load finished.
    fn initialized(&self) {}

    /// The sync task hit an error it could not apply.
    fn handle_error(&self, _error: &Error) {}
}
