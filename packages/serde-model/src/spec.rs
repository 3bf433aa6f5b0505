//! Model specifications: where a model lives and how it is stored.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use treecache_core::{CreateMode, PathError, ZPath};

use crate::serializer::{JsonModelSerializer, ModelSerializer};

/// Options applied when a modeled client creates a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOption {
    /// Create missing ancestors (with empty payloads) first.
    CreateParentsIfNeeded,
    /// If the node already exists, overwrite its data instead of failing.
    SetDataIfExists,
}

/// Options applied when a modeled client deletes a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOption {
    /// Deleting a node that doesn't exist succeeds.
    Quietly,
}

/// Binds a model type to a path, a serializer, and create/delete options.
///
/// # Example
///
/// ```rust
/// use treecache_core::path;
/// use treecache_serde::{CreateOption, ModelSpec};
///
/// let spec = ModelSpec::<u32>::json(path!("/counters"))
///     .with_create_option(CreateOption::CreateParentsIfNeeded);
///
/// let child = spec.at("hits").unwrap();
/// assert_eq!(child.path(), &path!("/counters/hits"));
/// assert!(child.create_options().contains(&CreateOption::CreateParentsIfNeeded));
/// ```
pub struct ModelSpec<T> {
    path: ZPath,
    serializer: Arc<dyn ModelSerializer<T>>,
    create_mode: CreateMode,
    create_options: BTreeSet<CreateOption>,
    delete_options: BTreeSet<DeleteOption>,
}

impl<T> ModelSpec<T> {
    pub fn new(path: ZPath, serializer: Arc<dyn ModelSerializer<T>>) -> Self {
        Self {
            path,
            serializer,
            create_mode: CreateMode::Persistent,
            create_options: BTreeSet::new(),
            delete_options: BTreeSet::new(),
        }
    }

    /// A spec that stores models as JSON.
    pub fn json(path: ZPath) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Self::new(path, Arc::new(JsonModelSerializer::<T>::new()))
    }

    pub fn with_create_mode(mut self, mode: CreateMode) -> Self {
        self.create_mode = mode;
        self
    }

    pub fn with_create_option(mut self, option: CreateOption) -> Self {
        self.create_options.insert(option);
        self
    }

    pub fn with_delete_option(mut self, option: DeleteOption) -> Self {
        self.delete_options.insert(option);
        self
    }

    /// The same spec bound to `self.path()/child`.
    pub fn at(&self, child: &str) -> Result<Self, PathError> {
        Ok(Self {
            path: self.path.child(child)?,
            ..self.clone()
        })
    }

    pub fn path(&self) -> &ZPath {
        &self.path
    }

    pub fn serializer(&self) -> &Arc<dyn ModelSerializer<T>> {
        &self.serializer
    }

    pub fn create_mode(&self) -> CreateMode {
        self.create_mode
    }

    pub fn create_options(&self) -> &BTreeSet<CreateOption> {
        &self.create_options
    }

    pub fn delete_options(&self) -> &BTreeSet<DeleteOption> {
        &self.delete_options
    }

    pub fn has_create_option(&self, option: CreateOption) -> bool {
        self.create_options.contains(&option)
    }

    pub fn has_delete_option(&self, option: DeleteOption) -> bool {
        self.delete_options.contains(&option)
    }
}

impl<T> Clone for ModelSpec<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            serializer: Arc::clone(&self.serializer),
            create_mode: self.create_mode,
            create_options: self.create_options.clone(),
            delete_options: self.delete_options.clone(),
        }
    }
}

impl<T> fmt::Debug for ModelSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("path", &self.path)
            .field("create_mode", &self.create_mode)
            .field("create_options", &self.create_options)
            .field("delete_options", &self.delete_options)
            .finish_non_exhaustive()
    }
}
