//! Error types shared by every layer.

use thiserror::Error;

use crate::path::{PathError, ZPath};

/// Errors reported by the remote store, the cache and the facade.
///
/// Remote-originated variants (`NoSuchNode`, `NodeExists`, `VersionConflict`,
/// `NotEmpty`, `NoParent`, `TransactionFailed`) mirror the store's own
/// signals so callers can handle cached and non-cached paths identically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The node does not exist.
    #[error("no node: {path}")]
    NoSuchNode { path: ZPath },

    /// The node already exists.
    #[error("node exists: {path}")]
    NodeExists { path: ZPath },

    /// A version guard did not match the node's current version.
    #[error("version conflict at {path}: expected {expected}, actual {actual}")]
    VersionConflict {
        path: ZPath,
        expected: i32,
        actual: i32,
    },

    /// The node has children and cannot be deleted.
    #[error("node not empty: {path}")]
    NotEmpty { path: ZPath },

    /// The parent of the node to create does not exist.
    #[error("no parent for node: {path}")]
    NoParent { path: ZPath },

    /// An operation in a transaction failed; nothing was applied.
    #[error("transaction failed at operation {index}: {cause}")]
    TransactionFailed { index: usize, cause: Box<Error> },

    /// Path validation error.
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// Model (de)serialization failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// A pending operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The outcome of an async stage was already taken.
    #[error("stage outcome already consumed")]
    Consumed,

    /// A component was used out of lifecycle order.
    #[error("lifecycle error: {message}")]
    Lifecycle { message: String },

    /// Generic error with message.
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Shorthand for a [`Error::NoSuchNode`] at `path`.
    pub fn no_node(path: &ZPath) -> Self {
        Error::NoSuchNode { path: path.clone() }
    }

    /// Whether this is (or, for transactions, was caused by) a missing node.
    pub fn is_no_node(&self) -> bool {
        match self {
            Error::NoSuchNode { .. } => true,
            Error::TransactionFailed { cause, .. } => cause.is_no_node(),
            _ => false,
        }
    }

    /// Whether this is (or, for transactions, was caused by) a version conflict.
    pub fn is_version_conflict(&self) -> bool {
        match self {
            Error::VersionConflict { .. } => true,
            Error::TransactionFailed { cause, .. } => cause.is_version_conflict(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            message: e.to_string(),
        }
    }
}

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;
