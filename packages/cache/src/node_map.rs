//! The cache's map of nodes plus its parent -> children index.

use std::collections::{HashMap, HashSet};

use treecache_core::{CachedNode, ZPath};

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upsert {
    Added,
    Updated,
    /// Same stat as the cached node.
    Unchanged,
    /// Older than the cached node; ignored.
    Stale,
}

#[derive(Debug)]
pub(crate) struct NodeMap<T> {
    nodes: HashMap<ZPath, CachedNode<T>>,
    children: HashMap<ZPath, HashSet<ZPath>>,
}

impl<T> Default for NodeMap<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            children: HashMap::new(),
        }
    }
}

impl<T: Clone> NodeMap<T> {
    pub(crate) fn get(&self, path: &ZPath) -> Option<&CachedNode<T>> {
        self.nodes.get(path)
    }

    pub(crate) fn children(&self, path: &ZPath) -> HashMap<ZPath, CachedNode<T>> {
        self.children
            .get(path)
            .map(|set| {
                set.iter()
                    .filter_map(|child| {
                        self.nodes
                            .get(child)
                            .map(|node| (child.clone(), node.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert or replace `path`, never regressing to an older stat.
    pub(crate) fn upsert(&mut self, path: &ZPath, node: CachedNode<T>) -> Upsert {
        if let Some(existing) = self.nodes.get(path) {
            if existing.stat().is_newer_than(node.stat()) {
                return Upsert::Stale;
            }
            if existing.stat() == node.stat() {
                return Upsert::Unchanged;
            }
            self.nodes.insert(path.clone(), node);
            return Upsert::Updated;
        }

        self.nodes.insert(path.clone(), node);
        if let Some(parent) = path.parent() {
            self.children.entry(parent).or_default().insert(path.clone());
        }
        Upsert::Added
    }

    pub(crate) fn remove(&mut self, path: &ZPath) -> Option<CachedNode<T>> {
        let removed = self.nodes.remove(path)?;
        if let Some(parent) = path.parent() {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(path);
                if siblings.is_empty() {
                    self.children.remove(&parent);
                }
            }
        }
        Some(removed)
    }

    /// Remove every node not in `keep`, returning what was removed.
    pub(crate) fn retain(&mut self, keep: &HashSet<ZPath>) -> Vec<(ZPath, CachedNode<T>)> {
        let gone: Vec<ZPath> = self
            .nodes
            .keys()
            .filter(|path| !keep.contains(*path))
            .cloned()
            .collect();
        gone.into_iter()
            .filter_map(|path| self.remove(&path).map(|node| (path, node)))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.children.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treecache_core::{path, Stat};

    fn node(model: &str, modified_txn: i64) -> CachedNode<String> {
        CachedNode::new(
            model.to_string(),
            Stat {
                modified_txn,
                ..Stat::default()
            },
        )
    }

    #[test]
    fn upsert_then_get() {
        let mut map = NodeMap::default();
        assert_eq!(map.upsert(&path!("/a"), node("a", 1)), Upsert::Added);
        assert_eq!(map.get(&path!("/a")).unwrap().model(), "a");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn upsert_never_regresses() {
        let mut map = NodeMap::default();
        map.upsert(&path!("/a"), node("new", 5));
        assert_eq!(map.upsert(&path!("/a"), node("old", 4)), Upsert::Stale);
        assert_eq!(map.get(&path!("/a")).unwrap().model(), "new");

        assert_eq!(map.upsert(&path!("/a"), node("newer", 6)), Upsert::Updated);
        assert_eq!(map.get(&path!("/a")).unwrap().model(), "newer");
    }

    #[test]
    fn identical_stat_is_unchanged() {
        let mut map = NodeMap::default();
        map.upsert(&path!("/a"), node("a", 2));
        assert_eq!(map.upsert(&path!("/a"), node("a", 2)), Upsert::Unchanged);
    }

    #[test]
    fn children_are_immediate_only() {
        let mut map = NodeMap::default();
        map.upsert(&path!("/a"), node("a", 1));
        map.upsert(&path!("/a/b"), node("b", 2));
        map.upsert(&path!("/a/b/c"), node("c", 3));
        map.upsert(&path!("/a/d"), node("d", 4));

        let children = map.children(&path!("/a"));
        let mut keys: Vec<_> = children.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec![path!("/a/b"), path!("/a/d")]);
        assert_eq!(children[&path!("/a/b")].model(), "b");

        // parent need not be cached itself
        assert_eq!(map.children(&ZPath::root()).len(), 1);
        assert!(map.children(&path!("/zzz")).is_empty());
    }

    #[test]
    fn remove_updates_children_index() {
        let mut map = NodeMap::default();
        map.upsert(&path!("/a/b"), node("b", 1));
        assert_eq!(map.remove(&path!("/a/b")).unwrap().model(), "b");
        assert!(map.children(&path!("/a")).is_empty());
        assert!(map.remove(&path!("/a/b")).is_none());
    }

    #[test]
    fn retain_drops_vanished() {
        let mut map = NodeMap::default();
        map.upsert(&path!("/a"), node("a", 1));
        map.upsert(&path!("/b"), node("b", 2));
        let keep: HashSet<ZPath> = [path!("/a")].into_iter().collect();

        let removed = map.retain(&keep);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, path!("/b"));
        assert!(map.get(&path!("/a")).is_some());
        assert!(map.get(&path!("/b")).is_none());
    }

    #[test]
    fn clear_empties_everything() {
        let mut map = NodeMap::default();
        map.upsert(&path!("/a/b"), node("b", 1));
        map.clear();
        assert_eq!(map.len(), 0);
        assert!(map.children(&path!("/a")).is_empty());
    }
}
