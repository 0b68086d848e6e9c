// == Std
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    ops::Range,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

// == Internal crates
use super::{
    client::MetadataApi,
    model::{ChildEntry, Node},
};
use crate::common::{RemotePath, RemotePathError};

// == External crates
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::trace;

#[derive(Debug, Clone, Error)]
pub enum MockMetadataError {
    #[error("No entry exists at '{0}'")]
    NotFound(RemotePath),
    #[error("Injected failure for '{0}'")]
    Injected(RemotePath),
}

#[derive(Debug, Error)]
pub enum MockLoadError {
    #[error("Invalid mock data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid path in mock data: {0}")]
    Path(#[from] RemotePathError),
    #[error("'{0}' is listed as a file but also has children")]
    FileWithChildren(RemotePath),
    #[error("'{path}' is not inside the namespace root '{root}'")]
    OutsideRoot { path: RemotePath, root: RemotePath },
}

/// One entry of the flat mock data format produced by the mock data generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockRecord {
    pub path: RemotePath,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone)]
enum MockEntry {
    File { size: u64 },
    Directory { children: BTreeSet<RemotePath> },
}

/// In-memory stand-in for the remote metadata endpoint.
pub struct MockMetadataApi {
    entries: BTreeMap<RemotePath, MockEntry>,
    /// Simulated latency range for requests, in milliseconds, each request will be delayed by a random number of
    /// milliseconds within this range
    request_latency_range_ms: Range<u32>,
    failing_paths: HashSet<RemotePath>,
    malformed_paths: HashSet<RemotePath>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fetch_count: AtomicUsize,
    fetch_log: Mutex<Vec<RemotePath>>,
}

impl MockMetadataApi {
    /// Builds a namespace rooted at `root` from flat records. Missing parent directories are created implicitly.
    pub fn new(root: RemotePath, records: impl IntoIterator<Item = MockRecord>) -> Result<Self, MockLoadError> {
        let mut entries = BTreeMap::new();
        entries.insert(
            root.clone(),
            MockEntry::Directory {
                children: BTreeSet::new(),
            },
        );

        let mut api = MockMetadataApi {
            entries,
            request_latency_range_ms: 0..1,
            failing_paths: HashSet::new(),
            malformed_paths: HashSet::new(),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            fetch_count: AtomicUsize::new(0),
            fetch_log: Mutex::new(vec![]),
        };

        for record in records {
            if record.path == root || !record.path.starts_with(&root) {
                return Err(MockLoadError::OutsideRoot {
                    path: record.path,
                    root,
                });
            }

            let entry = if record.is_dir {
                MockEntry::Directory {
                    children: BTreeSet::new(),
                }
            } else {
                MockEntry::File { size: record.size }
            };
            api.insert(record.path, entry)?;
        }

        Ok(api)
    }

    /// Builds a namespace from the JSON record list written by the mock data generator
    pub fn from_json(root: RemotePath, json: &str) -> Result<Self, MockLoadError> {
        let records: Vec<MockRecord> = serde_json::from_str(json)?;
        Self::new(root, records)
    }

    pub fn with_latency_ms(mut self, range: Range<u32>) -> Self {
        self.request_latency_range_ms = range;
        self
    }

    /// Every fetch of `path` fails
    pub fn fail_path(mut self, path: RemotePath) -> Self {
        self.failing_paths.insert(path);
        self
    }

    /// Every fetch of `path` succeeds but returns a node without a path
    pub fn malform_path(mut self, path: RemotePath) -> Self {
        self.malformed_paths.insert(path);
        self
    }

    /// Total number of `fetch_node` calls made so far
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Highest number of `fetch_node` calls that were in flight at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Paths passed to `fetch_node`, in call order
    pub fn fetched_paths(&self) -> Vec<RemotePath> {
        self.fetch_log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn insert(&mut self, path: RemotePath, entry: MockEntry) -> Result<(), MockLoadError> {
        let Some(parent) = path.parent() else {
            // The namespace root always exists as a directory
            return Ok(());
        };

        self.ensure_directory(&parent)?;
        if let Some(MockEntry::Directory { children }) = self.entries.get_mut(&parent) {
            children.insert(path.clone());
        }

        match (self.entries.get(&path), &entry) {
            // Keep children already registered through an implicit parent
            (Some(MockEntry::Directory { .. }), MockEntry::Directory { .. }) => {}
            (Some(MockEntry::Directory { children }), MockEntry::File { .. }) if !children.is_empty() => {
                return Err(MockLoadError::FileWithChildren(path));
            }
            _ => {
                self.entries.insert(path, entry);
            }
        }
        Ok(())
    }

    fn ensure_directory(&mut self, path: &RemotePath) -> Result<(), MockLoadError> {
        match self.entries.get(path) {
            Some(MockEntry::Directory { .. }) => Ok(()),
            Some(MockEntry::File { .. }) => Err(MockLoadError::FileWithChildren(path.clone())),
            None => self.insert(
                path.clone(),
                MockEntry::Directory {
                    children: BTreeSet::new(),
                },
            ),
        }
    }

    fn resolve(&self, path: &RemotePath) -> Result<Node, MockMetadataError> {
        if self.failing_paths.contains(path) {
            return Err(MockMetadataError::Injected(path.clone()));
        }

        let node = match self.entries.get(path) {
            Some(MockEntry::File { size }) => Node::file(path.clone(), *size),
            Some(MockEntry::Directory { children }) => Node::directory(
                path.clone(),
                children
                    .iter()
                    .filter_map(|child| match self.entries.get(child) {
                        Some(MockEntry::File { size }) => Some(ChildEntry::file(child.clone(), *size)),
                        Some(MockEntry::Directory { .. }) => Some(ChildEntry::directory(child.clone())),
                        None => None,
                    })
                    .collect(),
            ),
            None => return Err(MockMetadataError::NotFound(path.clone())),
        };

        if self.malformed_paths.contains(path) {
            Ok(Node { path: None, ..node })
        } else {
            Ok(node)
        }
    }

    async fn delay(&self) {
        let delay_ms = if self.request_latency_range_ms.is_empty() {
            0
        } else {
            rand::random_range(self.request_latency_range_ms.clone())
        };
        if delay_ms > 0 {
            trace!(delay_ms, "MockMetadataApi delaying request");
        }
        sleep(Duration::from_millis(delay_ms as u64)).await;
    }
}

impl MetadataApi for MockMetadataApi {
    type Error = MockMetadataError;

    async fn fetch_node(&self, path: &RemotePath) -> Result<Node, MockMetadataError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.fetch_log.lock() {
            log.push(path.clone());
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        self.delay().await;
        let result = self.resolve(path);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> RemotePath {
        RemotePath::new(p).unwrap()
    }

    fn sample_api() -> MockMetadataApi {
        let json = r#"[
            { "path": "subdir/nested/file.txt", "size": 12 },
            { "path": "subdir/empty", "is_dir": true },
            { "path": "top.txt", "size": 3 }
        ]"#;
        MockMetadataApi::from_json(RemotePath::default(), json).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_node() {
        let mock_api = sample_api();

        let root = mock_api.fetch_node(&RemotePath::default()).await.unwrap();
        assert!(root.is_dir);
        assert_eq!(
            root.contents,
            vec![
                ChildEntry::directory(path("subdir")),
                ChildEntry::file(path("top.txt"), 3),
            ]
        );

        let subdir = mock_api.fetch_node(&path("subdir")).await.unwrap();
        assert_eq!(
            subdir.contents,
            vec![
                ChildEntry::directory(path("subdir/empty")),
                ChildEntry::directory(path("subdir/nested")),
            ],
            "Implicit parents should be created as directories"
        );

        let file = mock_api.fetch_node(&path("subdir/nested/file.txt")).await.unwrap();
        assert_eq!(file, Node::file(path("subdir/nested/file.txt"), 12));

        let missing = mock_api.fetch_node(&path("missing/path")).await;
        assert!(matches!(missing, Err(MockMetadataError::NotFound(_))));

        assert_eq!(mock_api.fetch_count(), 4);
        assert_eq!(mock_api.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let mock_api = sample_api()
            .fail_path(path("subdir"))
            .malform_path(path("subdir/nested"));

        let failed = mock_api.fetch_node(&path("subdir")).await;
        assert!(matches!(failed, Err(MockMetadataError::Injected(_))));

        let malformed = mock_api.fetch_node(&path("subdir/nested")).await.unwrap();
        assert!(malformed.is_dir);
        assert_eq!(malformed.resolved_path(), None);
    }

    #[test]
    fn test_file_with_children_is_rejected() {
        let records = vec![
            MockRecord {
                path: path("a/b.txt"),
                is_dir: false,
                size: 1,
            },
            MockRecord {
                path: path("a/b.txt/c.txt"),
                is_dir: false,
                size: 1,
            },
        ];
        let result = MockMetadataApi::new(RemotePath::default(), records);
        assert!(matches!(result, Err(MockLoadError::FileWithChildren(_))));
    }

    #[test]
    fn test_records_outside_root_are_rejected() {
        let records = vec![MockRecord {
            path: path("/mirror/a.txt"),
            is_dir: false,
            size: 1,
        }];
        let result = MockMetadataApi::new(RemotePath::default(), records.clone());
        assert!(
            matches!(result, Err(MockLoadError::OutsideRoot { ref path, .. }) if path.as_str() == "/mirror/a.txt"),
            "An absolute record should not load under the relative root"
        );

        let result = MockMetadataApi::new(path("/other"), records.clone());
        assert!(matches!(result, Err(MockLoadError::OutsideRoot { .. })));

        let root_record = vec![MockRecord {
            path: path("/mirror"),
            is_dir: false,
            size: 1,
        }];
        let result = MockMetadataApi::new(path("/mirror"), root_record);
        assert!(
            matches!(result, Err(MockLoadError::OutsideRoot { .. })),
            "The root itself cannot be redefined"
        );

        assert!(MockMetadataApi::new(path("/"), records).is_ok());
    }

    #[tokio::test]
    async fn test_absolute_root() {
        let records = vec![MockRecord {
            path: path("/root/a/x"),
            is_dir: false,
            size: 10,
        }];
        let mock_api = MockMetadataApi::new(path("/root"), records).unwrap();

        let root = mock_api.fetch_node(&path("/root")).await.unwrap();
        assert_eq!(root.contents, vec![ChildEntry::directory(path("/root/a"))]);
    }
}
