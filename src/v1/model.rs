// == Internal crates
use crate::common::RemotePath;

// == External crates
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metadata for one resolved path, as returned by the metadata endpoint.
///
/// For directories, `contents` lists the immediate children only. A Node is produced by a
/// [`MetadataApi`](super::client::MetadataApi) and consumed once by the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    /// The path of this node. A reply without one is malformed.
    #[cfg_attr(feature = "serde", serde(default, deserialize_with = "deserialize_lenient_path"))]
    pub path: Option<RemotePath>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_dir: bool,
    /// Size in bytes, meaningful only for files
    #[cfg_attr(feature = "serde", serde(default))]
    pub size: u64,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub contents: Vec<ChildEntry>,
}

impl Node {
    /// Creates a directory node with the given children
    pub fn directory(path: RemotePath, contents: Vec<ChildEntry>) -> Self {
        Node {
            path: Some(path),
            is_dir: true,
            size: 0,
            contents,
        }
    }

    /// Creates a file node
    pub fn file(path: RemotePath, size: u64) -> Self {
        Node {
            path: Some(path),
            is_dir: false,
            size,
            contents: vec![],
        }
    }

    /// Returns the path of this node if it identifies anything. An empty path is treated the same as a missing one.
    pub fn resolved_path(&self) -> Option<&RemotePath> {
        self.path.as_ref().filter(|path| !path.as_str().is_empty())
    }
}

/// One immediate child listed in a directory [`Node`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChildEntry {
    pub path: RemotePath,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_dir: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub size: u64,
}

impl ChildEntry {
    pub fn file(path: RemotePath, size: u64) -> Self {
        ChildEntry {
            path,
            is_dir: false,
            size,
        }
    }

    pub fn directory(path: RemotePath) -> Self {
        ChildEntry {
            path,
            is_dir: true,
            size: 0,
        }
    }
}

/// A discovered file. Terminal: never fetched or expanded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileEntry {
    pub path: RemotePath,
    pub size: u64,
}

impl FileEntry {
    pub fn new(path: RemotePath, size: u64) -> Self {
        FileEntry { path, size }
    }
}

impl From<ChildEntry> for FileEntry {
    fn from(child: ChildEntry) -> Self {
        FileEntry::new(child.path, child.size)
    }
}

/// Decodes `path` without failing the whole node: an unusable path string becomes `None`, which the collector
/// reports as a malformed node rather than a transport failure.
#[cfg(feature = "serde")]
fn deserialize_lenient_path<'de, D>(deserializer: D) -> Result<Option<RemotePath>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|path| RemotePath::new(path).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> RemotePath {
        RemotePath::new(p).unwrap()
    }

    #[test]
    fn test_resolved_path() {
        let node = Node::file(path("docs/a.txt"), 3);
        assert_eq!(node.resolved_path(), Some(&path("docs/a.txt")));

        let mut missing = Node::directory(path("docs"), vec![]);
        missing.path = None;
        assert_eq!(missing.resolved_path(), None);

        let empty = Node::directory(RemotePath::default(), vec![]);
        assert_eq!(empty.resolved_path(), None, "An empty path does not identify a node");
    }

    #[test]
    fn test_file_entry_from_child() {
        let child = ChildEntry::file(path("a/x"), 10);
        assert_eq!(FileEntry::from(child), FileEntry::new(path("a/x"), 10));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_decode_metadata_reply() {
        let json = r#"{
            "path": "/photos",
            "is_dir": true,
            "size": 0,
            "contents": [
                { "path": "/photos/2024", "is_dir": true },
                { "path": "/photos/cover.jpg", "is_dir": false, "size": 2048 }
            ]
        }"#;

        let node: Node = serde_json::from_str(json).unwrap();
        assert!(node.is_dir);
        assert_eq!(node.resolved_path(), Some(&path("/photos")));
        assert_eq!(
            node.contents,
            vec![
                ChildEntry::directory(path("/photos/2024")),
                ChildEntry::file(path("/photos/cover.jpg"), 2048),
            ]
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_decode_reply_without_path() {
        let node: Node = serde_json::from_str(r#"{ "is_dir": true, "contents": [] }"#).unwrap();
        assert_eq!(node.resolved_path(), None);

        let node: Node = serde_json::from_str(r#"{ "path": "a/../b", "is_dir": false }"#).unwrap();
        assert_eq!(node.resolved_path(), None, "An unusable path should decode as missing");
    }
}
