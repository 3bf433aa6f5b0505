//! In-memory remote tree.
//!
//! `MemoryTree` implements the full `TreeClient` surface in-process:
//! versioned nodes, version guards, all-or-nothing transactions, and a
//! change-notification stream. Use it wherever a real coordination service
//! would be overkill, and to test caches and modeled clients end to end.

mod config;
mod tree;

pub use config::MemoryTreeConfig;
pub use tree::MemoryTree;
