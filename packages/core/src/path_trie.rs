//! A generic prefix trie keyed by path segments.
//!
//! `PathTrie<T>` provides O(k) operations where k is the path depth.
//! Each node can optionally hold a value, and has children indexed by segment.

use std::collections::BTreeMap;

use crate::ZPath;

/// A prefix trie keyed by path segments.
///
/// # Example
///
/// ```rust
/// use treecache_core::{PathTrie, path};
///
/// let mut trie: PathTrie<i32> = PathTrie::new();
/// trie.insert(&path!("/a"), 1);
/// trie.insert(&path!("/a/b"), 2);
///
/// assert_eq!(trie.get(&path!("/a/b")), Some(&2));
/// assert_eq!(trie.child_names(&path!("/a")), vec!["b"]);
/// ```
#[derive(Debug, Clone)]
pub struct PathTrie<T> {
    value: Option<T>,
    children: BTreeMap<String, PathTrie<T>>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T> PathTrie<T> {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// Navigate to node, creating intermediate nodes as needed.
    fn get_or_create_node(&mut self, path: &ZPath) -> &mut PathTrie<T> {
        let mut current = self;
        for segment in path.iter() {
            current = current.children.entry(segment.to_string()).or_default();
        }
        current
    }

    /// Navigate to node if it exists.
    fn get_node(&self, path: &ZPath) -> Option<&PathTrie<T>> {
        let mut current = self;
        for segment in path.iter() {
            current = current.children.get(segment)?;
        }
        Some(current)
    }

    /// Navigate to node if it exists (mutable).
    fn get_node_mut(&mut self, path: &ZPath) -> Option<&mut PathTrie<T>> {
        let mut current = self;
        for segment in path.iter() {
            current = current.children.get_mut(segment)?;
        }
        Some(current)
    }

    /// Insert a value at path. Returns previous value if any.
    pub fn insert(&mut self, path: &ZPath, value: T) -> Option<T> {
        self.get_or_create_node(path).value.replace(value)
    }

    /// Remove and return entire subtree at path.
    pub fn remove_subtree(&mut self, path: &ZPath) -> Option<PathTrie<T>> {
        match (path.parent(), path.node_name()) {
            (Some(parent_path), Some(name)) => {
                self.get_node_mut(&parent_path)?.children.remove(name)
            }
            _ => {
                let old = std::mem::take(self);
                if old.value.is_some() || !old.children.is_empty() {
                    Some(old)
                } else {
                    None
                }
            }
        }
    }

    /// Get reference to value at exact path.
    pub fn get(&self, path: &ZPath) -> Option<&T> {
        self.get_node(path)?.value.as_ref()
    }

    /// Get mutable reference to value at exact path.
    pub fn get_mut(&mut self, path: &ZPath) -> Option<&mut T> {
        self.get_node_mut(path)?.value.as_mut()
    }

    /// Check if exact path has a value.
    pub fn contains_value(&self, path: &ZPath) -> bool {
        self.get(path).is_some()
    }

    /// Names of the immediate children of `path` that hold a value.
    pub fn child_names(&self, path: &ZPath) -> Vec<&str> {
        self.get_node(path)
            .map(|node| {
                node.children
                    .iter()
                    .filter(|(_, child)| child.value.is_some())
                    .map(|(name, _)| name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Count of values in trie (not nodes).
    pub fn len(&self) -> usize {
        let self_count = usize::from(self.value.is_some());
        let children_count: usize = self.children.values().map(|child| child.len()).sum();
        self_count + children_count
    }

    /// True if no values anywhere in trie.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.values().all(|c| c.is_empty())
    }
}
