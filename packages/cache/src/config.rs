//! Cache configuration.

use serde::{Deserialize, Serialize};

use treecache_core::{Error, Result};

/// Configuration for a [`ModeledCache`](crate::ModeledCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Bulk-load the subtree when the cache starts. Without it the cache
    /// fills only from change notifications.
    pub load_initial: bool,
    /// How many levels below the root to cache. `Some(0)` caches only the
    /// root node; `None` caches the whole subtree.
    pub max_depth: Option<usize>,
    /// Reload the subtree when the change stream reports lost events.
    pub resync_on_lag: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            load_initial: true,
            max_depth: None,
            resync_on_lag: true,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Other {
            message: format!("invalid cache config: {}", e),
        })
    }

    pub fn with_load_initial(mut self, load_initial: bool) -> Self {
        self.load_initial = load_initial;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_resync_on_lag(mut self, resync: bool) -> Self {
        self.resync_on_lag = resync;
        self
    }
}
