//! Absolute, slash-delimited node paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors related to path parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A path segment is not allowed.
    InvalidSegment {
        segment: String,
        position: usize,
        message: String,
    },
    /// The path string is invalid.
    InvalidPath { message: String },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::InvalidSegment {
                segment,
                position,
                message,
            } => {
                write!(
                    f,
                    "invalid path segment '{}' at position {}: {}",
                    segment, position, message
                )
            }
            PathError::InvalidPath { message } => {
                write!(f, "invalid path: {}", message)
            }
        }
    }
}

impl std::error::Error for PathError {}

/// An absolute path to a node in the tree.
///
/// The root is `/` and has no segments. Every other path is a `/`-separated
/// list of non-empty segments, e.g. `/services/api/config`.
///
/// Paths are values: two paths are equal iff their segments are equal, and
/// every operation that "changes" a path returns a new one.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ZPath {
    segments: Vec<String>,
}

impl ZPath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse an absolute path string.
    ///
    /// # Path Syntax
    ///
    /// - Must start with `/`
    /// - `/` alone is the root
    /// - No empty segments (`//`) and no trailing `/`
    /// - `.` and `..` are not segments, and NUL is never allowed
    ///
    /// # Examples
    ///
    /// ```rust
    /// use treecache_core::ZPath;
    ///
    /// let path = ZPath::parse("/users/alice").unwrap();
    /// assert_eq!(path.len(), 2);
    /// assert_eq!(path.to_string(), "/users/alice");
    ///
    /// assert!(ZPath::parse("users/alice").is_err());
    /// assert!(ZPath::parse("/users/").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PathError::InvalidPath {
                message: format!("'{}' must start with '/'", s),
            });
        };

        if rest.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        for (i, segment) in segments.iter().enumerate() {
            Self::validate_segment(segment, i)?;
        }

        Ok(ZPath { segments })
    }

    fn validate_segment(segment: &str, position: usize) -> Result<(), PathError> {
        let message = if segment.is_empty() {
            "empty segment"
        } else if segment == "." || segment == ".." {
            "relative segments are not allowed"
        } else if segment.contains('/') {
            "segment contains '/'"
        } else if segment.contains('\0') {
            "segment contains NUL"
        } else {
            return Ok(());
        };

        Err(PathError::InvalidSegment {
            segment: segment.to_string(),
            position,
            message: message.to_string(),
        })
    }

    /// Derive the child path `self/name`.
    ///
    /// `name` must be exactly one valid segment.
    pub fn child(&self, name: &str) -> Result<ZPath, PathError> {
        Self::validate_segment(name, self.segments.len())?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(ZPath { segments })
    }

    /// The parent path, or `None` for the root.
    pub fn parent(&self) -> Option<ZPath> {
        let (_, init) = self.segments.split_last()?;
        Some(ZPath {
            segments: init.to_vec(),
        })
    }

    /// The last segment, or `None` for the root.
    pub fn node_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Alias for [`ZPath::is_root`].
    pub fn is_empty(&self) -> bool {
        self.is_root()
    }

    /// Iterate over segments.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Check if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &ZPath) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix.segments[..] == self.segments[..prefix.segments.len()]
    }

    /// Segments below `prefix`, or `None` if `prefix` doesn't match.
    pub fn strip_prefix(&self, prefix: &ZPath) -> Option<&[String]> {
        if self.starts_with(prefix) {
            Some(&self.segments[prefix.segments.len()..])
        } else {
            None
        }
    }

    /// The full path string, e.g. `/a/b`.
    pub fn full_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ZPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for ZPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ZPath::parse(s)
    }
}

impl Serialize for ZPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ZPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Macro for creating paths from literals.
///
/// # Example
///
/// ```rust
/// use treecache_core::path;
///
/// let p = path!("/users/alice");
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::ZPath::parse($s).expect("invalid path literal")
    };
}
