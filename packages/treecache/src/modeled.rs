//! A typed remote client bound to one path.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use treecache_cache::CacheConfig;
use treecache_core::{AsyncStage, Error, Op, OpResult, PathError, Result, Stat, TreeClient, ZPath};
use treecache_serde::{CreateOption, DeleteOption, ModelSpec};

use crate::cached::CachedModeledClient;

/// Reads and writes models of type `T` at the path of its [`ModelSpec`],
/// always against the remote store.
///
/// Every operation returns an [`AsyncStage`]. Remote work is lazy: it runs
/// when the stage is awaited or resolved. A model that fails to serialize
/// yields an already-failed stage.
pub struct ModeledClient<T> {
    spec: ModelSpec<T>,
    client: Arc<dyn TreeClient>,
}

impl<T> Clone for ModeledClient<T> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            client: Arc::clone(&self.client),
        }
    }
}

impl<T> fmt::Debug for ModeledClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeledClient")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> ModeledClient<T> {
    pub fn new(client: Arc<dyn TreeClient>, spec: ModelSpec<T>) -> Self {
        Self { spec, client }
    }

    pub fn model_spec(&self) -> &ModelSpec<T> {
        &self.spec
    }

    pub fn client(&self) -> &Arc<dyn TreeClient> {
        &self.client
    }

    pub fn path(&self) -> &ZPath {
        self.spec.path()
    }

    /// A client bound to `path()/child`, sharing the remote client.
    pub fn at(&self, child: &str) -> std::result::Result<Self, PathError> {
        Ok(Self {
            spec: self.spec.at(child)?,
            client: Arc::clone(&self.client),
        })
    }

    /// A cached facade over this client with the default cache config.
    pub fn cached(&self) -> CachedModeledClient<T>
    where
        T: Clone,
    {
        self.cached_with_config(CacheConfig::default())
    }

    pub fn cached_with_config(&self, config: CacheConfig) -> CachedModeledClient<T>
    where
        T: Clone,
    {
        CachedModeledClient::new(self.clone(), config)
    }

    /// Create the node holding `model`. Resolves to the created path.
    pub fn set(&self, model: &T) -> AsyncStage<ZPath> {
        self.set_with_stat(model).map(|(path, _)| path)
    }

    /// Like [`set`](Self::set), also resolving to the node's new stat.
    pub fn set_with_stat(&self, model: &T) -> AsyncStage<(ZPath, Stat)> {
        let data = match self.spec.serializer().serialize(model) {
            Ok(data) => data,
            Err(e) => return AsyncStage::failed(e),
        };
        let client = Arc::clone(&self.client);
        let path = self.path().clone();
        let mode = self.spec.create_mode();
        let create_parents = self.spec.has_create_option(CreateOption::CreateParentsIfNeeded);
        let overwrite = self.spec.has_create_option(CreateOption::SetDataIfExists);

        AsyncStage::pending(async move {
            trace!(path = %path, ?mode, "set");
            match client.create(&path, data.clone(), mode, create_parents).await {
                Err(Error::NodeExists { .. }) if overwrite => {
                    let stat = client.set_data(&path, data, None).await?;
                    Ok((path, stat))
                }
                outcome => outcome,
            }
        })
    }

    /// Read and decode the node straight from the remote store.
    pub fn read(&self) -> AsyncStage<T> {
        self.read_with_stat().map(|(model, _)| model)
    }

    pub fn read_with_stat(&self) -> AsyncStage<(T, Stat)> {
        let client = Arc::clone(&self.client);
        let serializer = Arc::clone(self.spec.serializer());
        let path = self.path().clone();

        AsyncStage::pending(async move {
            trace!(path = %path, "read");
            let (data, stat) = client.get_data(&path).await?;
            Ok((serializer.deserialize(&data)?, stat))
        })
    }

    /// Replace the node's data with `model`, whatever its version.
    pub fn update(&self, model: &T) -> AsyncStage<Stat> {
        self.update_guarded(model, None)
    }

    /// Replace the node's data only if its version is `version`.
    pub fn update_with_version(&self, model: &T, version: i32) -> AsyncStage<Stat> {
        self.update_guarded(model, Some(version))
    }

    fn update_guarded(&self, model: &T, version: Option<i32>) -> AsyncStage<Stat> {
        let data = match self.spec.serializer().serialize(model) {
            Ok(data) => data,
            Err(e) => return AsyncStage::failed(e),
        };
        let client = Arc::clone(&self.client);
        let path = self.path().clone();

        AsyncStage::pending(async move {
            trace!(path = %path, ?version, "update");
            client.set_data(&path, data, version).await
        })
    }

    pub fn delete(&self) -> AsyncStage<()> {
        self.delete_guarded(None)
    }

    pub fn delete_with_version(&self, version: i32) -> AsyncStage<()> {
        self.delete_guarded(Some(version))
    }

    fn delete_guarded(&self, version: Option<i32>) -> AsyncStage<()> {
        let client = Arc::clone(&self.client);
        let path = self.path().clone();
        let quietly = self.spec.has_delete_option(DeleteOption::Quietly);

        AsyncStage::pending(async move {
            trace!(path = %path, ?version, "delete");
            match client.delete(&path, version).await {
                Err(e) if quietly && e.is_no_node() => Ok(()),
                outcome => outcome,
            }
        })
    }

    /// Resolves to the node's stat, or `None` if it doesn't exist.
    pub fn check_exists(&self) -> AsyncStage<Option<Stat>> {
        let client = Arc::clone(&self.client);
        let path = self.path().clone();

        AsyncStage::pending(async move { client.exists(&path).await })
    }

    /// Paths of the node's children, in name order.
    pub fn children(&self) -> AsyncStage<Vec<ZPath>> {
        let client = Arc::clone(&self.client);
        let path = self.path().clone();

        AsyncStage::pending(async move {
            let mut names = client.get_children(&path).await?;
            names.sort();
            names
                .iter()
                .map(|name| path.child(name).map_err(Error::from))
                .collect()
        })
    }

    /// A create descriptor for `model` at this path.
    pub fn create_op(&self, model: &T) -> Result<Op> {
        let data = self.spec.serializer().serialize(model)?;
        Ok(Op::create(self.path().clone(), data, self.spec.create_mode()))
    }

    pub fn update_op(&self, model: &T) -> Result<Op> {
        let data = self.spec.serializer().serialize(model)?;
        Ok(Op::set_data(self.path().clone(), data, None))
    }

    pub fn update_op_with_version(&self, model: &T, version: i32) -> Result<Op> {
        let data = self.spec.serializer().serialize(model)?;
        Ok(Op::set_data(self.path().clone(), data, Some(version)))
    }

    pub fn delete_op(&self) -> Op {
        Op::delete(self.path().clone(), None)
    }

    pub fn delete_op_with_version(&self, version: i32) -> Op {
        Op::delete(self.path().clone(), Some(version))
    }

    pub fn check_exists_op(&self) -> Op {
        Op::check(self.path().clone(), None)
    }

    pub fn check_exists_op_with_version(&self, version: i32) -> Op {
        Op::check(self.path().clone(), Some(version))
    }

    /// Submit `ops` as one all-or-nothing transaction.
    pub fn in_transaction(&self, ops: Vec<Op>) -> AsyncStage<Vec<OpResult>> {
        let client = Arc::clone(&self.client);

        AsyncStage::pending(async move {
            trace!(ops = ops.len(), "transaction");
            client.multi(ops).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use treecache_core::{path, CreateMode, OpType};
    use treecache_memory::MemoryTree;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: u32,
    }

    fn person(name: &str, age: u32) -> Person {
        Person {
            name: name.to_string(),
            age,
        }
    }

    fn modeled(tree: &Arc<MemoryTree>, spec: ModelSpec<Person>) -> ModeledClient<Person> {
        ModeledClient::new(Arc::clone(tree) as Arc<dyn TreeClient>, spec)
    }

    #[tokio::test]
    async fn set_then_read() {
        let tree = Arc::new(MemoryTree::new());
        let client = modeled(&tree, ModelSpec::json(path!("/alice")));

        let created = client.set(&person("alice", 30)).await.unwrap();
        assert_eq!(created, path!("/alice"));

        let (model, stat) = client.read_with_stat().await.unwrap();
        assert_eq!(model, person("alice", 30));
        assert_eq!(stat.version, 0);
    }

    #[tokio::test]
    async fn set_without_parents_fails() {
        let tree = Arc::new(MemoryTree::new());
        let client = modeled(&tree, ModelSpec::json(path!("/people/alice")));

        let err = client.set(&person("alice", 30)).await.unwrap_err();
        assert!(matches!(err, Error::NoParent { .. }));
    }

    #[tokio::test]
    async fn set_creates_parents_when_asked() {
        let tree = Arc::new(MemoryTree::new());
        let spec = ModelSpec::json(path!("/people/alice"))
            .with_create_option(CreateOption::CreateParentsIfNeeded);
        let client = modeled(&tree, spec);

        client.set(&person("alice", 30)).await.unwrap();
        assert!(tree.exists(&path!("/people")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn set_existing_node() {
        let tree = Arc::new(MemoryTree::new());
        let client = modeled(&tree, ModelSpec::json(path!("/alice")));
        client.set(&person("alice", 30)).await.unwrap();

        let err = client.set(&person("alice", 31)).await.unwrap_err();
        assert!(matches!(err, Error::NodeExists { .. }));

        let overwriting = modeled(
            &tree,
            ModelSpec::json(path!("/alice")).with_create_option(CreateOption::SetDataIfExists),
        );
        let (_, stat) = overwriting.set_with_stat(&person("alice", 31)).await.unwrap();
        assert_eq!(stat.version, 1);
        assert_eq!(client.read().await.unwrap().age, 31);
    }

    #[tokio::test]
    async fn update_honours_version() {
        let tree = Arc::new(MemoryTree::new());
        let client = modeled(&tree, ModelSpec::json(path!("/alice")));
        client.set(&person("alice", 30)).await.unwrap();

        let stat = client.update_with_version(&person("alice", 31), 0).await.unwrap();
        assert_eq!(stat.version, 1);

        let err = client
            .update_with_version(&person("alice", 32), 0)
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());

        client.update(&person("alice", 33)).await.unwrap();
        assert_eq!(client.read().await.unwrap().age, 33);
    }

    #[tokio::test]
    async fn delete_quietly() {
        let tree = Arc::new(MemoryTree::new());
        let loud = modeled(&tree, ModelSpec::json(path!("/ghost")));
        assert!(loud.delete().await.unwrap_err().is_no_node());

        let quiet = modeled(
            &tree,
            ModelSpec::json(path!("/ghost")).with_delete_option(DeleteOption::Quietly),
        );
        quiet.delete().await.unwrap();
    }

    #[tokio::test]
    async fn delete_with_version_guard() {
        let tree = Arc::new(MemoryTree::new());
        let client = modeled(&tree, ModelSpec::json(path!("/alice")));
        client.set(&person("alice", 30)).await.unwrap();

        assert!(client.delete_with_version(4).await.unwrap_err().is_version_conflict());
        client.delete_with_version(0).await.unwrap();
        assert!(client.check_exists().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn children_lists_paths() {
        let tree = Arc::new(MemoryTree::new());
        let root = modeled(
            &tree,
            ModelSpec::json(path!("/people")).with_create_option(CreateOption::CreateParentsIfNeeded),
        );
        root.at("bob").unwrap().set(&person("bob", 40)).await.unwrap();
        root.at("alice").unwrap().set(&person("alice", 30)).await.unwrap();

        let children = root.children().await.unwrap();
        assert_eq!(children, vec![path!("/people/alice"), path!("/people/bob")]);
    }

    #[tokio::test]
    async fn serialization_failure_is_a_failed_stage() {
        struct Broken;
        impl treecache_serde::ModelSerializer<Person> for Broken {
            fn serialize(&self, _model: &Person) -> Result<treecache_core::Bytes> {
                Err(Error::Serialization {
                    message: "nope".to_string(),
                })
            }
            fn deserialize(&self, _data: &[u8]) -> Result<Person> {
                Err(Error::Serialization {
                    message: "nope".to_string(),
                })
            }
        }

        let tree = Arc::new(MemoryTree::new());
        let client = modeled(&tree, ModelSpec::new(path!("/x"), Arc::new(Broken)));

        let stage = client.set(&person("x", 1));
        assert!(stage.is_done());
        assert!(matches!(stage.await, Err(Error::Serialization { .. })));
        assert!(client.create_op(&person("x", 1)).is_err());
        assert_eq!(tree.node_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn stages_are_lazy() {
        let tree = Arc::new(MemoryTree::new());
        let client = modeled(&tree, ModelSpec::json(path!("/alice")));

        let mut stage = client.set(&person("alice", 30));
        assert!(!stage.is_done());
        assert!(tree.exists(&path!("/alice")).await.unwrap().is_none());

        assert!(stage.cancel());
        assert!(tree.exists(&path!("/alice")).await.unwrap().is_none());
    }

    #[test]
    fn op_builders_target_bound_path() {
        let tree = Arc::new(MemoryTree::new());
        let client = modeled(
            &tree,
            ModelSpec::json(path!("/alice")).with_create_mode(CreateMode::Ephemeral),
        );

        let create = client.create_op(&person("alice", 30)).unwrap();
        assert!(matches!(create, Op::Create { mode: CreateMode::Ephemeral, .. }));
        assert_eq!(client.update_op(&person("a", 1)).unwrap().op_type(), OpType::SetData);
        assert_eq!(
            client.update_op_with_version(&person("a", 1), 3).unwrap(),
            Op::set_data(path!("/alice"), serde_json::to_vec(&person("a", 1)).unwrap(), Some(3))
        );
        assert_eq!(client.delete_op(), Op::delete(path!("/alice"), None));
        assert_eq!(client.delete_op_with_version(2), Op::delete(path!("/alice"), Some(2)));
        assert_eq!(client.check_exists_op(), Op::check(path!("/alice"), None));
        assert_eq!(client.check_exists_op_with_version(7), Op::check(path!("/alice"), Some(7)));
        // building ops never touches the store
        assert_eq!(tree.node_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn transaction_is_atomic() {
        let tree = Arc::new(MemoryTree::new());
        let alice = modeled(&tree, ModelSpec::json(path!("/alice")));
        let bob = modeled(&tree, ModelSpec::json(path!("/bob")));
        alice.set(&person("alice", 30)).await.unwrap();

        let ops = vec![
            bob.create_op(&person("bob", 40)).unwrap(),
            alice.update_op_with_version(&person("alice", 99), 5).unwrap(),
        ];
        let err = alice.in_transaction(ops).await.unwrap_err();
        assert!(matches!(err, Error::TransactionFailed { index: 1, .. }));
        assert!(bob.check_exists().await.unwrap().is_none());

        let ops = vec![
            bob.create_op(&person("bob", 40)).unwrap(),
            alice.update_op_with_version(&person("alice", 31), 0).unwrap(),
        ];
        let results = alice.in_transaction(ops).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].result_path, Some(path!("/bob")));
        assert_eq!(alice.read().await.unwrap().age, 31);
    }
}
