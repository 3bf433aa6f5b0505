//! Serde integration for modeled nodes.
//!
//! This layer maps typed models onto node payloads:
//! - `ModelSerializer`: Model <-> bytes
//! - `JsonModelSerializer`: The JSON serializer
//! - `ModelSpec`: Path + serializer + create/delete options for one model
//!
//! # Example
//!
//! ```rust
//! use treecache_core::path;
//! use treecache_serde::{ModelSerializer, ModelSpec};
//!
//! let spec = ModelSpec::<Vec<String>>::json(path!("/peers"));
//! let bytes = spec.serializer().serialize(&vec!["a".to_string()]).unwrap();
//! assert_eq!(&bytes[..], br#"["a"]"#);
//! ```

pub use bytes::Bytes;

mod serializer;
mod spec;

pub use serializer::{JsonModelSerializer, ModelSerializer};
pub use spec::{CreateOption, DeleteOption, ModelSpec};
