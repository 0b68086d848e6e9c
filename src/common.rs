// == Std
use std::{
    fmt::Display,
    iter::FusedIterator,
    path::{Path, PathBuf},
};

// == External crates
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with RemotePath
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemotePathError {
    #[error("The provided path '{0}' is invalid as a remote path")]
    InvalidPath(String),
    #[error("Failed to convert OS path: {0}")]
    OsPathConversionError(PathBuf),
}

/// Newtype for a path in the remote storage namespace.
///
/// Always uses `/` as the separator and is always valid UTF-8. A single leading `/` marks the path as absolute and is
/// kept as given, since the remote service distinguishes the two forms. Trailing separators are trimmed. Empty
/// components and the relative components `.` and `..` are rejected. The empty path (and `/`) names the namespace root.
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct RemotePath(String);

impl Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RemotePath {
    /// Creates a new RemotePath from the given string. Will normalize separators to `/`.
    pub fn new(path: impl AsRef<str>) -> Result<Self, RemotePathError> {
        let normalized = path.as_ref().replace('\\', "/");
        let absolute = normalized.starts_with('/');
        let body = normalized.trim_start_matches('/').trim_end_matches('/');

        if absolute && normalized.starts_with("//") && !body.is_empty() {
            return Err(RemotePathError::InvalidPath(normalized));
        }
        if !body.is_empty()
            && body
                .split('/')
                .any(|component| component.is_empty() || component == "." || component == "..")
        {
            return Err(RemotePathError::InvalidPath(normalized));
        }

        if absolute {
            Ok(RemotePath(format!("/{body}")))
        } else {
            Ok(RemotePath(body.to_string()))
        }
    }

    /// Returns the string representation of the remote path
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this path names the namespace root
    pub fn is_empty(&self) -> bool {
        self.body().is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    /// Returns an iterator over the non-empty components of the path
    pub fn components(&self) -> RemotePathComponents<'_> {
        let body = self.body();
        RemotePathComponents {
            inner: body,
            front: 0,
            back: body.len(),
        }
    }

    /// Number of segments in the path. The root has depth 0, `a` has depth 1, `/a/b` has depth 2.
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// Returns the parent of this path, or None for the root
    pub fn parent(&self) -> Option<RemotePath> {
        if self.is_empty() {
            return None;
        }

        let body = self.body();
        let parent_body = body.rfind('/').map(|i| &body[..i]).unwrap_or("");
        if self.is_absolute() {
            Some(RemotePath(format!("/{parent_body}")))
        } else {
            Some(RemotePath(parent_body.to_string()))
        }
    }

    /// Returns true if `base` is this path or one of its ancestors. Absolute and relative paths never contain each
    /// other.
    pub fn starts_with(&self, base: &RemotePath) -> bool {
        if self.is_absolute() != base.is_absolute() {
            return false;
        }

        let mut components = self.components();
        base.components().all(|component| components.next() == Some(component))
    }

    /// Appends a single component or relative sub-path to this path
    pub fn try_join(&self, name: impl AsRef<str>) -> Result<RemotePath, RemotePathError> {
        let tail = RemotePath::new(name.as_ref())?;
        if tail.is_absolute() {
            return Err(RemotePathError::InvalidPath(tail.0));
        }
        if tail.is_empty() {
            return Ok(self.clone());
        }

        if self.is_empty() {
            if self.is_absolute() {
                Ok(RemotePath(format!("/{}", tail.0)))
            } else {
                Ok(tail)
            }
        } else {
            Ok(RemotePath(format!("{}/{}", self.0, tail.0)))
        }
    }

    /// The path without its absolute marker
    fn body(&self) -> &str {
        self.0.strip_prefix('/').unwrap_or(&self.0)
    }
}

impl Ord for RemotePath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.is_absolute()
            .cmp(&other.is_absolute())
            .then_with(|| self.components().cmp(other.components()))
    }
}

impl PartialOrd for RemotePath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq<str> for RemotePath {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RemotePath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl TryFrom<String> for RemotePath {
    type Error = RemotePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RemotePath::new(value)
    }
}

impl From<RemotePath> for String {
    fn from(value: RemotePath) -> Self {
        value.0
    }
}

impl TryFrom<&Path> for RemotePath {
    type Error = RemotePathError;

    fn try_from(value: &Path) -> Result<Self, Self::Error> {
        if let Some(path_str) = value.to_str() {
            RemotePath::new(path_str)
        } else {
            Err(RemotePathError::OsPathConversionError(value.to_path_buf()))
        }
    }
}

/// A double-ended iterator over the components of a RemotePath
#[derive(Debug, Clone)]
pub struct RemotePathComponents<'a> {
    inner: &'a str,
    front: usize,
    back: usize,
}

impl<'a> Iterator for RemotePathComponents<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }

        let rest = &self.inner[self.front..self.back];
        let len = rest.find('/').unwrap_or(rest.len());
        let component = &rest[..len];
        // +1 to skip the separator
        self.front += len + 1;
        Some(component)
    }
}

impl<'a> DoubleEndedIterator for RemotePathComponents<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }

        let rest = &self.inner[self.front..self.back];
        let start = rest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let component = &rest[start..];
        // Stop before the separator preceding this component
        self.back = if start == 0 { self.front } else { self.front + start - 1 };
        Some(component)
    }
}

impl<'a> FusedIterator for RemotePathComponents<'a> {}
