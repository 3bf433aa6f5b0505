//! Model serializers.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use treecache_core::{Error, Result};

/// Converts between a typed model and a node's byte payload.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn ModelSerializer<T>>`.
pub trait ModelSerializer<T>: Send + Sync {
    /// Encode a model into a payload.
    fn serialize(&self, model: &T) -> Result<Bytes>;

    /// Decode a payload into a model.
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// A serializer that stores models as JSON.
///
/// This is the default serializer for most use cases.
///
/// # Example
///
/// ```rust
/// use treecache_serde::{JsonModelSerializer, ModelSerializer};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Endpoint {
///     host: String,
///     port: u16,
/// }
///
/// let serializer = JsonModelSerializer::<Endpoint>::new();
/// let endpoint = Endpoint { host: "10.0.0.1".into(), port: 8080 };
///
/// let bytes = serializer.serialize(&endpoint).unwrap();
/// assert_eq!(serializer.deserialize(&bytes).unwrap(), endpoint);
/// ```
pub struct JsonModelSerializer<T> {
    _model: PhantomData<fn() -> T>,
}

impl<T> JsonModelSerializer<T> {
    pub fn new() -> Self {
        Self {
            _model: PhantomData,
        }
    }
}

impl<T> Default for JsonModelSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonModelSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonModelSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonModelSerializer")
    }
}

impl<T> ModelSerializer<T> for JsonModelSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, model: &T) -> Result<Bytes> {
        let bytes = serde_json::to_vec(model).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })?;
        Ok(Bytes::from(bytes))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization {
            message: e.to_string(),
        })
    }
}
