//! The hierarchical cache and the task that keeps it in sync.
//!
//! A [`ModeledCache`] mirrors the subtree under its root. Reads never touch
//! the remote store; they see whatever the sync task last applied. The sync
//! task subscribes to the store's change stream, bulk-loads the subtree, and
//! then re-reads each node it is told about. Deletions evict.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use treecache_core::{CachedNode, Error, Result, TreeClient, TreeEvent, TreeEventKind, ZPath};
use treecache_serde::{ModelSerializer, ModelSpec};

use crate::config::CacheConfig;
use crate::listener::{ModeledCacheEvent, ModeledCacheListener};
use crate::node_map::{NodeMap, Upsert};

enum Lifecycle {
    Latent,
    Started(JoinHandle<()>),
    Closed,
}

/// A read-only, eventually consistent mirror of a subtree, decoded into
/// models of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let cache = ModeledCache::from_spec(&spec, client, CacheConfig::default());
/// cache.start()?;
///
/// // Later, once the sync task has caught up:
/// if let Some(node) = cache.current_data(&path!("/users/alice")) {
///     println!("{:?} at version {}", node.model(), node.stat().version);
/// }
/// cache.close();
/// ```
pub struct ModeledCache<T> {
    shared: Arc<Shared<T>>,
    lifecycle: Mutex<Lifecycle>,
}

/// State shared between the cache handle and its sync task.
struct Shared<T> {
    root: ZPath,
    client: Arc<dyn TreeClient>,
    serializer: Arc<dyn ModelSerializer<T>>,
    config: CacheConfig,
    nodes: RwLock<NodeMap<T>>,
    listeners: RwLock<Vec<Arc<dyn ModeledCacheListener<T>>>>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> ModeledCache<T> {
    pub fn new(
        root: ZPath,
        client: Arc<dyn TreeClient>,
        serializer: Arc<dyn ModelSerializer<T>>,
        config: CacheConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                root,
                client,
                serializer,
                config,
                nodes: RwLock::new(NodeMap::default()),
                listeners: RwLock::new(Vec::new()),
                initialized: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            lifecycle: Mutex::new(Lifecycle::Latent),
        }
    }

    /// A cache rooted at the model spec's path, decoding with its serializer.
    pub fn from_spec(spec: &ModelSpec<T>, client: Arc<dyn TreeClient>, config: CacheConfig) -> Self {
        Self::new(
            spec.path().clone(),
            client,
            Arc::clone(spec.serializer()),
            config,
        )
    }

    pub fn root(&self) -> &ZPath {
        &self.shared.root
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Register a listener. Listeners added after start only see later changes.
    pub fn add_listener(&self, listener: Arc<dyn ModeledCacheListener<T>>) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Spawn the sync task on the current tokio runtime.
    ///
    /// Fails with [`Error::Lifecycle`] if the cache was already started or
    /// closed, or if no runtime is available.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lock_lifecycle();
        match *lifecycle {
            Lifecycle::Latent => {}
            Lifecycle::Started(_) => {
                return Err(Error::Lifecycle {
                    message: format!("cache at {} is already started", self.shared.root),
                })
            }
            Lifecycle::Closed => {
                return Err(Error::Lifecycle {
                    message: format!("cache at {} is closed", self.shared.root),
                })
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::Lifecycle {
            message: format!(
                "cache at {} needs a tokio runtime to start: {}",
                self.shared.root, e
            ),
        })?;

        // Subscribe before loading so nothing between load and watch is lost.
        let events = self.shared.client.subscribe();
        let span = tracing::info_span!("modeled_cache", root = %self.shared.root);
        let task = runtime.spawn(Arc::clone(&self.shared).run(events).instrument(span));

        *lifecycle = Lifecycle::Started(task);
        info!(root = %self.shared.root, "cache started");
        Ok(())
    }

    /// Stop syncing and drop every cached node. Safe to call more than once.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_lifecycle(), Lifecycle::Closed);
        if matches!(previous, Lifecycle::Closed) {
            return;
        }

        self.shared.closed.store(true, Ordering::SeqCst);
        if let Lifecycle::Started(task) = previous {
            task.abort();
        }
        self.shared.write_nodes().clear();
        info!(root = %self.shared.root, "cache closed");
    }

    /// Whether the initial load has finished (and the cache is not closed).
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst) && !self.is_closed()
    }

    pub fn is_started(&self) -> bool {
        matches!(*self.lock_lifecycle(), Lifecycle::Started(_))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// The cached snapshot at `path`, if any.
    pub fn current_data(&self, path: &ZPath) -> Option<CachedNode<T>> {
        let node = self.shared.read_nodes().get(path).cloned();
        debug!(path = %path, hit = node.is_some(), "cache lookup");
        node
    }

    /// Snapshots of the cached immediate children of `path`.
    pub fn current_children(&self, path: &ZPath) -> HashMap<ZPath, CachedNode<T>> {
        self.shared.read_nodes().children(path)
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.shared.read_nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for ModeledCache<T> {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Lifecycle::Started(task) = lifecycle {
            task.abort();
        }
    }
}

impl<T> fmt::Debug for ModeledCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeledCache")
            .field("root", &self.shared.root)
            .field("config", &self.shared.config)
            .field("closed", &self.shared.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    async fn run(self: Arc<Self>, mut events: broadcast::Receiver<TreeEvent>) {
        debug!("sync task started");
        if self.config.load_initial {
            match self.load().await {
                Ok(visited) => {
                    let cached = self.read_nodes().len();
                    debug!(visited = visited.len(), cached, "initial load complete");
                }
                Err(e) => self.report(&e),
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        for listener in self.listeners() {
            listener.initialized();
        }

        loop {
            match events.recv().await {
                Ok(event) => self.apply(event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change stream lagged");
                    if self.config.resync_on_lag {
                        self.resync().await;
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("change stream closed, sync task exiting");
                    break;
                }
            }
        }
    }

    async fn apply(&self, event: TreeEvent) {
        if !self.in_scope(&event.path) {
            return;
        }
        debug!(kind = ?event.kind, path = %event.path, "applying change");

        match event.kind {
            TreeEventKind::Deleted => self.evict(&event.path),
            TreeEventKind::Created | TreeEventKind::DataChanged | TreeEventKind::ChildrenChanged => {
                if let Err(e) = self.refresh(&event.path).await {
                    self.report(&e);
                }
            }
        }
    }

    /// Walk the subtree breadth-first, refreshing every node within depth.
    /// Returns the paths that exist remotely.
    async fn load(&self) -> Result<HashSet<ZPath>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([self.root.clone()]);

        while let Some(path) = queue.pop_front() {
            if !self.refresh(&path).await? {
                continue;
            }
            visited.insert(path.clone());

            let at_limit = match (self.depth_of(&path), self.config.max_depth) {
                (Some(depth), Some(max)) => depth >= max,
                _ => false,
            };
            if at_limit {
                continue;
            }

            let names = match self.client.get_children(&path).await {
                Ok(names) => names,
                Err(e) if e.is_no_node() => continue,
                Err(e) => return Err(e),
            };
            for name in names {
                queue.push_back(path.child(&name)?);
            }
        }

        Ok(visited)
    }

    /// Reload the whole subtree and evict anything that vanished.
    async fn resync(&self) {
        let visited = match self.load().await {
            Ok(visited) => visited,
            Err(e) => {
                self.report(&e);
                return;
            }
        };

        let removed = {
            let mut nodes = self.write_nodes();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            nodes.retain(&visited)
        };
        debug!(evicted = removed.len(), "resync complete");
        for (path, node) in removed {
            self.notify(ModeledCacheEvent::NodeRemoved, &path, &node);
        }
    }

    /// Re-read one node. Returns false if it no longer exists.
    async fn refresh(&self, path: &ZPath) -> Result<bool> {
        let (data, stat) = match self.client.get_data(path).await {
            Ok(found) => found,
            Err(e) if e.is_no_node() => {
                self.evict(path);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        // Empty payloads are structural parents, not models.
        if data.is_empty() {
            self.evict(path);
            return Ok(true);
        }

        match self.serializer.deserialize(&data) {
            Ok(model) => self.store(path, CachedNode::new(model, stat)),
            Err(e) => {
                warn!(path = %path, error = %e, "skipping node that failed to deserialize");
                self.notify_error(&e);
            }
        }
        Ok(true)
    }

    fn store(&self, path: &ZPath, node: CachedNode<T>) {
        let outcome = {
            let mut nodes = self.write_nodes();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            nodes.upsert(path, node.clone())
        };

        match outcome {
            Upsert::Added => self.notify(ModeledCacheEvent::NodeAdded, path, &node),
            Upsert::Updated => self.notify(ModeledCacheEvent::NodeUpdated, path, &node),
            Upsert::Unchanged => {}
            Upsert::Stale => debug!(path = %path, "ignoring stale snapshot"),
        }
    }

    fn evict(&self, path: &ZPath) {
        let removed = {
            let mut nodes = self.write_nodes();
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            nodes.remove(path)
        };
        if let Some(node) = removed {
            self.notify(ModeledCacheEvent::NodeRemoved, path, &node);
        }
    }

    fn depth_of(&self, path: &ZPath) -> Option<usize> {
        path.strip_prefix(&self.root).map(<[String]>::len)
    }

    fn in_scope(&self, path: &ZPath) -> bool {
        match self.depth_of(path) {
            Some(depth) => self.config.max_depth.map_or(true, |max| depth <= max),
            None => false,
        }
    }

    fn notify(&self, event: ModeledCacheEvent, path: &ZPath, node: &CachedNode<T>) {
        debug!(?event, path = %path, "cache changed");
        for listener in self.listeners() {
            listener.accept(event, path, node);
        }
    }

    fn report(&self, error: &Error) {
        warn!(error = %error, "sync failed");
        self.notify_error(error);
    }

    fn notify_error(&self, error: &Error) {
        for listener in self.listeners() {
            listener.handle_error(error);
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn ModeledCacheListener<T>>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // Each map update is a single call under the lock, so a poisoned map is
    // still consistent.
    fn read_nodes(&self) -> RwLockReadGuard<'_, NodeMap<T>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_nodes(&self) -> RwLockWriteGuard<'_, NodeMap<T>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use treecache_core::{path, CreateMode};
    use treecache_memory::{MemoryTree, MemoryTreeConfig};
    use treecache_serde::JsonModelSerializer;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
    }

    fn item(name: &str) -> Item {
        Item {
            name: name.to_string(),
        }
    }

    fn json(name: &str) -> Bytes {
        Bytes::from(serde_json::to_vec(&item(name)).unwrap())
    }

    async fn put(tree: &MemoryTree, p: &str, name: &str) {
        tree.create(&ZPath::parse(p).unwrap(), json(name), CreateMode::Persistent, true)
            .await
            .unwrap();
    }

    fn cache_over(tree: &Arc<MemoryTree>, root: ZPath, config: CacheConfig) -> ModeledCache<Item> {
        ModeledCache::new(
            root,
            Arc::clone(tree) as Arc<dyn TreeClient>,
            Arc::new(JsonModelSerializer::<Item>::new()),
            config,
        )
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition never became true");
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(ModeledCacheEvent, ZPath)>>,
        errors: Mutex<Vec<Error>>,
        initialized: AtomicBool,
    }

    impl ModeledCacheListener<Item> for Recorder {
        fn accept(&self, event: ModeledCacheEvent, path: &ZPath, _node: &CachedNode<Item>) {
            self.events.lock().unwrap().push((event, path.clone()));
        }

        fn initialized(&self) {
            self.initialized.store(true, Ordering::SeqCst);
        }

        fn handle_error(&self, error: &Error) {
            self.errors.lock().unwrap().push(error.clone());
        }
    }

    #[tokio::test]
    async fn initial_load_mirrors_subtree() {
        let tree = Arc::new(MemoryTree::new());
        put(&tree, "/app/a", "a").await;
        put(&tree, "/app/b", "b").await;
        put(&tree, "/other", "x").await;

        let cache = cache_over(&tree, path!("/app"), CacheConfig::default());
        cache.start().unwrap();
        eventually(|| cache.is_initialized()).await;

        assert_eq!(cache.current_data(&path!("/app/a")).unwrap().model(), &item("a"));
        assert_eq!(cache.current_children(&path!("/app")).len(), 2);
        // /app was created as an empty parent
        assert!(cache.current_data(&path!("/app")).is_none());
        assert!(cache.current_data(&path!("/other")).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn follows_remote_changes() {
        let tree = Arc::new(MemoryTree::new());
        put(&tree, "/app/a", "a").await;

        let cache = cache_over(&tree, path!("/app"), CacheConfig::default());
        cache.start().unwrap();
        eventually(|| cache.is_initialized()).await;

        tree.set_data(&path!("/app/a"), json("a2"), None).await.unwrap();
        eventually(|| {
            cache
                .current_data(&path!("/app/a"))
                .is_some_and(|n| n.model() == &item("a2"))
        })
        .await;
        assert_eq!(cache.current_data(&path!("/app/a")).unwrap().stat().version, 1);

        put(&tree, "/app/c", "c").await;
        eventually(|| cache.current_data(&path!("/app/c")).is_some()).await;

        tree.delete(&path!("/app/a"), None).await.unwrap();
        eventually(|| cache.current_data(&path!("/app/a")).is_none()).await;
        assert_eq!(cache.current_children(&path!("/app")).len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_errors() {
        let tree = Arc::new(MemoryTree::new());
        let cache = cache_over(&tree, path!("/app"), CacheConfig::default());

        cache.start().unwrap();
        assert!(cache.is_started());
        assert!(matches!(cache.start(), Err(Error::Lifecycle { .. })));

        cache.close();
        cache.close();
        assert!(cache.is_closed());
        assert!(matches!(cache.start(), Err(Error::Lifecycle { .. })));
    }

    #[test]
    fn start_without_runtime_fails() {
        let tree = Arc::new(MemoryTree::new());
        let cache = cache_over(&tree, path!("/app"), CacheConfig::default());
        let err = cache.start().unwrap_err();
        assert!(matches!(err, Error::Lifecycle { .. }));
        assert!(!cache.is_started());
    }

    #[tokio::test]
    async fn close_empties_cache() {
        let tree = Arc::new(MemoryTree::new());
        put(&tree, "/app/a", "a").await;

        let cache = cache_over(&tree, path!("/app"), CacheConfig::default());
        cache.start().unwrap();
        eventually(|| cache.len() == 1).await;

        cache.close();
        assert!(cache.is_empty());
        assert!(!cache.is_initialized());

        // later remote changes are not applied
        put(&tree, "/app/b", "b").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.current_data(&path!("/app/b")).is_none());
    }

    #[tokio::test]
    async fn max_depth_limits_caching() {
        let tree = Arc::new(MemoryTree::new());
        put(&tree, "/app/a", "a").await;
        put(&tree, "/app/a/deep", "deep").await;

        let cache = cache_over(&tree, path!("/app"), CacheConfig::new().with_max_depth(1));
        cache.start().unwrap();
        eventually(|| cache.is_initialized()).await;

        assert!(cache.current_data(&path!("/app/a")).is_some());
        assert!(cache.current_data(&path!("/app/a/deep")).is_none());

        put(&tree, "/app/a/deeper", "deeper").await;
        put(&tree, "/app/z", "z").await;
        eventually(|| cache.current_data(&path!("/app/z")).is_some()).await;
        assert!(cache.current_data(&path!("/app/a/deeper")).is_none());
    }

    #[tokio::test]
    async fn without_initial_load_fills_from_events() {
        let tree = Arc::new(MemoryTree::new());
        put(&tree, "/app/old", "old").await;

        let cache = cache_over(&tree, path!("/app"), CacheConfig::new().with_load_initial(false));
        cache.start().unwrap();
        eventually(|| cache.is_initialized()).await;
        assert!(cache.is_empty());

        put(&tree, "/app/new", "new").await;
        eventually(|| cache.current_data(&path!("/app/new")).is_some()).await;
        assert!(cache.current_data(&path!("/app/old")).is_none());
    }

    #[tokio::test]
    async fn listeners_see_changes_and_errors() {
        let tree = Arc::new(MemoryTree::new());
        put(&tree, "/app/a", "a").await;

        let recorder = Arc::new(Recorder::default());
        let cache = cache_over(&tree, path!("/app"), CacheConfig::default());
        cache.add_listener(Arc::clone(&recorder) as Arc<dyn ModeledCacheListener<Item>>);
        cache.start().unwrap();
        eventually(|| recorder.initialized.load(Ordering::SeqCst)).await;

        tree.set_data(&path!("/app/a"), json("a2"), None).await.unwrap();
        eventually(|| recorder.events.lock().unwrap().len() == 2).await;

        tree.create(
            &path!("/app/bad"),
            Bytes::from_static(b"not json"),
            CreateMode::Persistent,
            false,
        )
        .await
        .unwrap();
        eventually(|| !recorder.errors.lock().unwrap().is_empty()).await;

        tree.delete(&path!("/app/a"), None).await.unwrap();

        eventually(|| recorder.events.lock().unwrap().len() == 3).await;
        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (ModeledCacheEvent::NodeAdded, path!("/app/a")),
                (ModeledCacheEvent::NodeUpdated, path!("/app/a")),
                (ModeledCacheEvent::NodeRemoved, path!("/app/a")),
            ]
        );

        assert!(matches!(
            recorder.errors.lock().unwrap()[0],
            Error::Serialization { .. }
        ));
        assert!(cache.current_data(&path!("/app/bad")).is_none());
    }

    #[tokio::test]
    async fn lagged_stream_resyncs() {
        let tree = Arc::new(MemoryTree::with_config(
            MemoryTreeConfig::new().with_event_capacity(2),
        ));
        for i in 0..5 {
            put(&tree, &format!("/app/x{}", i), "x").await;
        }

        let cache = cache_over(&tree, path!("/app"), CacheConfig::default());
        cache.start().unwrap();
        eventually(|| cache.is_initialized() && cache.len() == 5).await;

        // Far more events than the channel holds, without yielding.
        for i in 0..5 {
            tree.delete(&ZPath::parse(&format!("/app/x{}", i)).unwrap(), None)
                .await
                .unwrap();
            put(&tree, &format!("/app/y{}", i), "y").await;
        }

        eventually(|| {
            cache.len() == 5 && cache.current_data(&path!("/app/y0")).is_some()
        })
        .await;
        assert!(cache.current_data(&path!("/app/x0")).is_none());
    }
}
