//! In-memory versioned tree.

use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::trace;

use treecache_core::{
    CreateMode, Error, Op, OpResult, PathTrie, Result, Stat, TreeClient, TreeEvent,
    TreeEventKind, ZPath,
};

use crate::config::MemoryTreeConfig;

#[derive(Debug, Clone)]
struct Znode {
    data: Bytes,
    stat: Stat,
}

#[derive(Debug, Clone)]
struct TreeState {
    nodes: PathTrie<Znode>,
    zxid: i64,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Stat lengths are 32 bits wide; larger payloads report `u32::MAX`.
fn data_length(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn check_version(path: &ZPath, expected: Option<i32>, actual: i32) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(Error::VersionConflict {
            path: path.clone(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

impl TreeState {
    fn new() -> Self {
        let mut nodes = PathTrie::new();
        nodes.insert(
            &ZPath::root(),
            Znode {
                data: Bytes::new(),
                stat: Stat::default(),
            },
        );
        Self { nodes, zxid: 0 }
    }

    fn next_txn(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn stat(&self, path: &ZPath) -> Result<Stat> {
        self.nodes
            .get(path)
            .map(|node| node.stat)
            .ok_or_else(|| Error::no_node(path))
    }

    fn update_parent(&mut self, path: &ZPath, delta: i64, events: &mut Vec<TreeEvent>) {
        let Some(parent) = path.parent() else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.stat.cversion += 1;
            node.stat.num_children = (i64::from(node.stat.num_children) + delta).max(0) as u32;
            events.push(TreeEvent::new(TreeEventKind::ChildrenChanged, parent));
        }
    }

    fn create(
        &mut self,
        path: &ZPath,
        data: Bytes,
        mode: CreateMode,
        session_id: u64,
        create_parents: bool,
        events: &mut Vec<TreeEvent>,
    ) -> Result<(ZPath, Stat)> {
        if self.nodes.contains_value(path) {
            return Err(Error::NodeExists { path: path.clone() });
        }
        let parent = path.parent().ok_or_else(|| Error::NodeExists { path: path.clone() })?;

        match self.nodes.get(&parent) {
            Some(node) if node.stat.is_ephemeral() => {
                return Err(Error::Other {
                    message: format!("ephemeral node {} cannot have children", parent),
                });
            }
            Some(_) => {}
            None if create_parents => {
                self.create(
                    &parent,
                    Bytes::new(),
                    CreateMode::Persistent,
                    session_id,
                    true,
                    events,
                )?;
            }
            None => return Err(Error::NoParent { path: path.clone() }),
        }

        let txn = self.next_txn();
        let now = now_millis();
        let stat = Stat {
            created_txn: txn,
            modified_txn: txn,
            ctime: now,
            mtime: now,
            version: 0,
            cversion: 0,
            ephemeral_owner: match mode {
                CreateMode::Ephemeral => session_id,
                CreateMode::Persistent => 0,
            },
            data_length: data_length(data.len()),
            num_children: 0,
        };
        self.nodes.insert(path, Znode { data, stat });
        events.push(TreeEvent::new(TreeEventKind::Created, path.clone()));
        self.update_parent(path, 1, events);

        Ok((path.clone(), stat))
    }

    fn set_data(
        &mut self,
        path: &ZPath,
        data: Bytes,
        version: Option<i32>,
        events: &mut Vec<TreeEvent>,
    ) -> Result<Stat> {
        check_version(path, version, self.stat(path)?.version)?;

        let txn = self.next_txn();
        let node = self.nodes.get_mut(path).ok_or_else(|| Error::no_node(path))?;
        node.stat.version += 1;
        node.stat.modified_txn = txn;
        node.stat.mtime = now_millis();
        node.stat.data_length = data_length(data.len());
        node.data = data;
        let stat = node.stat;

        events.push(TreeEvent::new(TreeEventKind::DataChanged, path.clone()));
        Ok(stat)
    }

    fn delete(
        &mut self,
        path: &ZPath,
        version: Option<i32>,
        events: &mut Vec<TreeEvent>,
    ) -> Result<()> {
        if path.is_root() {
            return Err(Error::Other {
                message: "the root node cannot be deleted".to_string(),
            });
        }
        check_version(path, version, self.stat(path)?.version)?;
        if !self.nodes.child_names(path).is_empty() {
            return Err(Error::NotEmpty { path: path.clone() });
        }

        self.next_txn();
        self.nodes.remove_subtree(path);
        events.push(TreeEvent::new(TreeEventKind::Deleted, path.clone()));
        self.update_parent(path, -1, events);
        Ok(())
    }

    fn check(&self, path: &ZPath, version: Option<i32>) -> Result<()> {
        check_version(path, version, self.stat(path)?.version)
    }

    fn apply(&mut self, op: Op, session_id: u64, events: &mut Vec<TreeEvent>) -> Result<OpResult> {
        let op_type = op.op_type();
        let for_path = op.path().clone();
        let (result_path, stat) = match op {
            Op::Create { path, data, mode } => {
                let (created, stat) = self.create(&path, data, mode, session_id, false, events)?;
                (Some(created), Some(stat))
            }
            Op::SetData {
                path,
                data,
                version,
            } => (None, Some(self.set_data(&path, data, version, events)?)),
            Op::Delete { path, version } => {
                self.delete(&path, version, events)?;
                (None, None)
            }
            Op::Check { path, version } => {
                self.check(&path, version)?;
                (None, None)
            }
        };
        Ok(OpResult {
            op_type,
            for_path,
            result_path,
            stat,
        })
    }
}

/// An in-process, versioned, transactional tree implementing [`TreeClient`].
///
/// Semantics follow a coordination-service data tree: a root node always
/// exists, creates need an existing parent, version guards are checked on
/// every guarded write, and non-empty nodes can't be deleted. Every
/// committed change is published on the [`TreeClient::subscribe`] stream in
/// commit order, after the change is visible to readers.
///
/// # Example
///
/// ```rust,ignore
/// use treecache_core::{CreateMode, TreeClient, path};
/// use treecache_memory::MemoryTree;
///
/// let tree = MemoryTree::new();
/// tree.create(&path!("/a"), "hello".into(), CreateMode::Persistent, false).await?;
///
/// let (data, stat) = tree.get_data(&path!("/a")).await?;
/// assert_eq!(&data[..], b"hello");
/// assert_eq!(stat.version, 0);
/// ```
pub struct MemoryTree {
    state: Mutex<TreeState>,
    events: broadcast::Sender<TreeEvent>,
    session_id: u64,
}

impl MemoryTree {
    /// Create an empty tree with default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryTreeConfig::default())
    }

    /// Create an empty tree.
    pub fn with_config(config: MemoryTreeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            state: Mutex::new(TreeState::new()),
            events,
            session_id: config.session_id,
        }
    }

    /// The session id stamped on ephemeral nodes.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> Result<usize> {
        Ok(self.lock()?.nodes.len())
    }

    /// The last committed transaction id.
    pub fn last_txn(&self) -> Result<i64> {
        Ok(self.lock()?.zxid)
    }

    fn lock(&self) -> Result<MutexGuard<'_, TreeState>> {
        self.state.lock().map_err(|e| Error::Other {
            message: format!("tree lock poisoned: {}", e),
        })
    }

    /// Run a mutation and publish its events while still holding the lock,
    /// so subscribers see events in commit order.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut TreeState, &mut Vec<TreeEvent>) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.lock()?;
        let mut events = Vec::new();
        let result = f(&mut state, &mut events)?;
        for event in events {
            trace!(kind = ?event.kind, path = %event.path, "publishing tree event");
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        Ok(result)
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeClient for MemoryTree {
    async fn create(
        &self,
        path: &ZPath,
        data: Bytes,
        mode: CreateMode,
        create_parents: bool,
    ) -> Result<(ZPath, Stat)> {
        trace!(path = %path, ?mode, create_parents, "create");
        let session_id = self.session_id;
        self.mutate(|state, events| {
            state.create(path, data, mode, session_id, create_parents, events)
        })
    }

    async fn set_data(&self, path: &ZPath, data: Bytes, version: Option<i32>) -> Result<Stat> {
        trace!(path = %path, ?version, "set_data");
        self.mutate(|state, events| state.set_data(path, data, version, events))
    }

    async fn get_data(&self, path: &ZPath) -> Result<(Bytes, Stat)> {
        trace!(path = %path, "get_data");
        let state = self.lock()?;
        state
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.stat))
            .ok_or_else(|| Error::no_node(path))
    }

    async fn delete(&self, path: &ZPath, version: Option<i32>) -> Result<()> {
        trace!(path = %path, ?version, "delete");
        self.mutate(|state, events| state.delete(path, version, events))
    }

    async fn exists(&self, path: &ZPath) -> Result<Option<Stat>> {
        trace!(path = %path, "exists");
        Ok(self.lock()?.nodes.get(path).map(|node| node.stat))
    }

    async fn get_children(&self, path: &ZPath) -> Result<Vec<String>> {
        trace!(path = %path, "get_children");
        let state = self.lock()?;
        if !state.nodes.contains_value(path) {
            return Err(Error::no_node(path));
        }
        Ok(state
            .nodes
            .child_names(path)
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    async fn multi(&self, ops: Vec<Op>) -> Result<Vec<OpResult>> {
        trace!(count = ops.len(), "multi");
        let session_id = self.session_id;
        self.mutate(|state, events| {
            let mut scratch = state.clone();
            let mut results = Vec::with_capacity(ops.len());
            for (index, op) in ops.into_iter().enumerate() {
                let result = scratch.apply(op, session_id, events).map_err(|cause| {
                    Error::TransactionFailed {
                        index,
                        cause: Box::new(cause),
                    }
                })?;
                results.push(result);
            }
            *state = scratch;
            Ok(results)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }
}
