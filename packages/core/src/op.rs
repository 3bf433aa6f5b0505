//! Operation descriptors for batched transactions.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::path::ZPath;
use crate::stat::Stat;

/// How a node is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// The node outlives the creating session.
    #[default]
    Persistent,
    /// The node is owned by the creating session.
    Ephemeral,
}

/// Kind of a transactional operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Create,
    SetData,
    Delete,
    Check,
}

/// An inert description of one intended remote operation.
///
/// Descriptors are collected into a batch and submitted with
/// `TreeClient::multi`; either all of them apply or none do. Building a
/// descriptor never touches the remote store or any cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Create a node.
    Create {
        path: ZPath,
        data: Bytes,
        mode: CreateMode,
    },
    /// Replace a node's data, optionally guarded by its current version.
    SetData {
        path: ZPath,
        data: Bytes,
        version: Option<i32>,
    },
    /// Delete a node, optionally guarded by its current version.
    Delete { path: ZPath, version: Option<i32> },
    /// Assert that a node exists, optionally at a given version.
    Check { path: ZPath, version: Option<i32> },
}

impl Op {
    pub fn create(path: ZPath, data: impl Into<Bytes>, mode: CreateMode) -> Self {
        Op::Create {
            path,
            data: data.into(),
            mode,
        }
    }

    pub fn set_data(path: ZPath, data: impl Into<Bytes>, version: Option<i32>) -> Self {
        Op::SetData {
            path,
            data: data.into(),
            version,
        }
    }

    pub fn delete(path: ZPath, version: Option<i32>) -> Self {
        Op::Delete { path, version }
    }

    pub fn check(path: ZPath, version: Option<i32>) -> Self {
        Op::Check { path, version }
    }

    /// The path this operation targets.
    pub fn path(&self) -> &ZPath {
        match self {
            Op::Create { path, .. }
            | Op::SetData { path, .. }
            | Op::Delete { path, .. }
            | Op::Check { path, .. } => path,
        }
    }

    /// The kind of this operation.
    pub fn op_type(&self) -> OpType {
        match self {
            Op::Create { .. } => OpType::Create,
            Op::SetData { .. } => OpType::SetData,
            Op::Delete { .. } => OpType::Delete,
            Op::Check { .. } => OpType::Check,
        }
    }
}

/// Outcome of one operation in a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    /// The kind of operation.
    pub op_type: OpType,
    /// The path the operation was submitted for.
    pub for_path: ZPath,
    /// The path actually created (creates only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<ZPath>,
    /// The node's stat after the operation (creates and set-data only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<Stat>,
}
