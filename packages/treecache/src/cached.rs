//! The cached facade: reads from the cache, writes to the remote store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use treecache_cache::{CacheConfig, ModeledCache};
use treecache_core::{AsyncStage, Error, Op, OpResult, PathError, Result, Stat, TreeClient, ZPath};
use treecache_serde::ModelSpec;

use crate::modeled::ModeledClient;

/// A [`ModeledClient`] whose reads are served from a shared [`ModeledCache`].
///
/// Read-family operations (`read`, `read_with_stat`, `check_exists`,
/// `children`, `read_children`) only ever consult the cache and return
/// already-resolved stages. A missing node is reported as
/// [`Error::NoSuchNode`]; the remote store is never asked.
///
/// Writes, deletes and transactions go straight to the remote store and do
/// not touch the cache. The cache catches up when the sync task sees the
/// change, so a read right after a successful write may still return the
/// old model. Use [`client()`](Self::client) to read your own writes.
///
/// Reads before [`start`](Self::start) or after [`close`](Self::close) see
/// an empty cache.
///
/// # Example
///
/// ```rust,ignore
/// let users = ModeledClient::new(tree, ModelSpec::<User>::json(path!("/users")))
///     .cached();
/// users.start()?;
///
/// let alice = users.at("alice")?;
/// alice.set(&User::new("alice")).await?;
/// // ...once the cache has observed the create:
/// let user = alice.read().await?;
/// ```
pub struct CachedModeledClient<T> {
    client: ModeledClient<T>,
    cache: Arc<ModeledCache<T>>,
}

impl<T> Clone for CachedModeledClient<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<T> fmt::Debug for CachedModeledClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedModeledClient")
            .field("client", &self.client)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> CachedModeledClient<T> {
    /// A facade with a new cache rooted at the client's path.
    pub fn new(client: ModeledClient<T>, config: CacheConfig) -> Self {
        let cache = ModeledCache::from_spec(client.model_spec(), Arc::clone(client.client()), config);
        Self {
            client,
            cache: Arc::new(cache),
        }
    }

    /// Start the cache's sync task. See [`ModeledCache::start`].
    pub fn start(&self) -> Result<()> {
        self.cache.start()
    }

    /// Close the shared cache, for this facade and every facade derived
    /// from it with [`at`](Self::at).
    pub fn close(&self) {
        self.cache.close()
    }

    pub fn cache(&self) -> &Arc<ModeledCache<T>> {
        &self.cache
    }

    /// The uncached client; reads through it always hit the remote store.
    pub fn client(&self) -> &ModeledClient<T> {
        &self.client
    }

    /// The underlying remote store.
    pub fn remote(&self) -> &Arc<dyn TreeClient> {
        self.client.client()
    }

    pub fn model_spec(&self) -> &ModelSpec<T> {
        self.client.model_spec()
    }

    pub fn path(&self) -> &ZPath {
        self.client.path()
    }

    pub fn cached(&self) -> Self {
        self.clone()
    }

    /// A facade bound to `path()/child`, reading from the same cache.
    pub fn at(&self, child: &str) -> std::result::Result<Self, PathError> {
        Ok(Self {
            client: self.client.at(child)?,
            cache: Arc::clone(&self.cache),
        })
    }

    /// The cached model, or [`Error::NoSuchNode`] if it isn't cached.
    pub fn read(&self) -> AsyncStage<T> {
        match self.cache.current_data(self.path()) {
            Some(node) => AsyncStage::completed(node.into_parts().0),
            None => AsyncStage::failed(Error::no_node(self.path())),
        }
    }

    /// The cached model with the stat it was cached with.
    pub fn read_with_stat(&self) -> AsyncStage<(T, Stat)> {
        match self.cache.current_data(self.path()) {
            Some(node) => AsyncStage::completed(node.into_parts()),
            None => AsyncStage::failed(Error::no_node(self.path())),
        }
    }

    /// The cached stat, or `None`. Never fails.
    pub fn check_exists(&self) -> AsyncStage<Option<Stat>> {
        let stat = self.cache.current_data(self.path()).map(|node| *node.stat());
        AsyncStage::completed(stat)
    }

    /// Paths of the cached children at the time of the call.
    pub fn children(&self) -> AsyncStage<BTreeSet<ZPath>> {
        let children = self.cache.current_children(self.path()).into_keys().collect();
        AsyncStage::completed(children)
    }

    /// Each cached child's model, as a resolved stage. Later cache changes
    /// don't affect the returned stages.
    pub fn read_children(&self) -> AsyncStage<BTreeMap<ZPath, AsyncStage<T>>> {
        let children = self
            .cache
            .current_children(self.path())
            .into_iter()
            .map(|(path, node)| (path, AsyncStage::completed(node.into_parts().0)))
            .collect();
        AsyncStage::completed(children)
    }

    pub fn set(&self, model: &T) -> AsyncStage<ZPath> {
        self.client.set(model)
    }

    pub fn set_with_stat(&self, model: &T) -> AsyncStage<(ZPath, Stat)> {
        self.client.set_with_stat(model)
    }

    pub fn update(&self, model: &T) -> AsyncStage<Stat> {
        self.client.update(model)
    }

    pub fn update_with_version(&self, model: &T, version: i32) -> AsyncStage<Stat> {
        self.client.update_with_version(model, version)
    }

    pub fn delete(&self) -> AsyncStage<()> {
        self.client.delete()
    }

    pub fn delete_with_version(&self, version: i32) -> AsyncStage<()> {
        self.client.delete_with_version(version)
    }

    pub fn create_op(&self, model: &T) -> Result<Op> {
        self.client.create_op(model)
    }

    pub fn update_op(&self, model: &T) -> Result<Op> {
        self.client.update_op(model)
    }

    pub fn update_op_with_version(&self, model: &T, version: i32) -> Result<Op> {
        self.client.update_op_with_version(model, version)
    }

    pub fn delete_op(&self) -> Op {
        self.client.delete_op()
    }

    pub fn delete_op_with_version(&self, version: i32) -> Op {
        self.client.delete_op_with_version(version)
    }

    pub fn check_exists_op(&self) -> Op {
        self.client.check_exists_op()
    }

    pub fn check_exists_op_with_version(&self, version: i32) -> Op {
        self.client.check_exists_op_with_version(version)
    }

    pub fn in_transaction(&self, ops: Vec<Op>) -> AsyncStage<Vec<OpResult>> {
        self.client.in_transaction(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treecache_core::path;
    use treecache_memory::MemoryTree;

    fn facade(tree: &Arc<MemoryTree>, root: ZPath) -> CachedModeledClient<String> {
        ModeledClient::new(Arc::clone(tree) as Arc<dyn TreeClient>, ModelSpec::json(root)).cached()
    }

    #[tokio::test]
    async fn reads_before_start_see_empty_cache() {
        let tree = Arc::new(MemoryTree::new());
        let root = facade(&tree, path!("/app"));
        root.client().set(&"hello".to_string()).await.unwrap();

        let err = root.read().await.unwrap_err();
        assert_eq!(err, Error::no_node(&path!("/app")));
        assert_eq!(root.check_exists().await.unwrap(), None);
        assert!(root.children().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_stages_are_already_resolved() {
        let tree = Arc::new(MemoryTree::new());
        let root = facade(&tree, path!("/app"));

        assert!(root.read().is_done());
        assert!(root.read_with_stat().is_done());
        assert!(root.check_exists().is_done());
        assert!(root.children().is_done());
        assert!(root.read_children().is_done());
    }

    #[test]
    fn at_shares_cache() {
        let tree = Arc::new(MemoryTree::new());
        let root = facade(&tree, path!("/app"));
        let child = root.at("a").unwrap();

        assert!(Arc::ptr_eq(root.cache(), child.cache()));
        assert!(Arc::ptr_eq(root.cache(), root.cached().cache()));
        assert!(Arc::ptr_eq(root.remote(), child.remote()));
        assert_eq!(child.path(), &path!("/app/a"));
        assert_eq!(child.cache().root(), &path!("/app"));
        assert!(root.at("a/b").is_err());
    }

    #[test]
    fn op_builders_delegate() {
        let tree = Arc::new(MemoryTree::new());
        let child = facade(&tree, path!("/app")).at("a").unwrap();

        assert_eq!(child.delete_op(), Op::delete(path!("/app/a"), None));
        assert_eq!(child.check_exists_op_with_version(1), Op::check(path!("/app/a"), Some(1)));
        assert_eq!(child.create_op(&"x".to_string()).unwrap().path(), &path!("/app/a"));
    }
}
