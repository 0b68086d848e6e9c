//! Recursive file listing on top of [`MetadataApi::fetch_node`].
//!
//! A fixed pool of workers pulls paths from one shared FIFO queue. Each fetched directory pushes its child
//! directories back onto the queue and records its child files directly, so files are never fetched on their own.
//! Failures are recorded per path and never stop sibling work. The run ends once nothing is queued or in flight.

// == Std
use std::collections::{HashSet, VecDeque};

// == Internal crates
use super::{
    client::MetadataApi,
    model::{FileEntry, Node},
};
use crate::common::RemotePath;

// == External crates
use enumset::{EnumSet, EnumSetType};
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Number of concurrent `fetch_node` calls used when none is configured
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Maximum number of `fetch_node` calls in flight at once. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Sort the result by path depth, shallower files first. Files at the same depth keep their discovery order.
    /// When false the order is whatever order the fetches completed in.
    pub order: bool,
    /// Cancelling this token stops the run from taking new work. Fetches already in flight are allowed to finish.
    pub cancel: CancellationToken,
}

impl Default for CollectOptions {
    fn default() -> Self {
        CollectOptions {
            concurrency: DEFAULT_CONCURRENCY,
            order: false,
            cancel: CancellationToken::new(),
        }
    }
}

impl CollectOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_order(mut self, order: bool) -> Self {
        self.order = order;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// The kinds of per-path failure that can occur during a run
#[derive(Debug, Hash, EnumSetType)]
pub enum FailureKind {
    /// `fetch_node` returned an error
    Resolution,
    /// `fetch_node` returned a node without a path
    MalformedNode,
}

pub type FailureKindSet = EnumSet<FailureKind>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraversalErrorKind {
    #[error("failed to fetch metadata: {0}")]
    Resolution(String),
    #[error("metadata reply has no path")]
    MalformedNode,
}

impl TraversalErrorKind {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            TraversalErrorKind::Resolution(_) => FailureKind::Resolution,
            TraversalErrorKind::MalformedNode => FailureKind::MalformedNode,
        }
    }
}

/// A path that could not be listed. Its subtree is not part of the result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not list '{path}': {kind}")]
pub struct TraversalError {
    pub path: RemotePath,
    pub kind: TraversalErrorKind,
}

/// Aggregate outcome of a run that did not finish cleanly
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("Some error occurred while collecting files ({failed} path(s) could not be listed)")]
    Incomplete { failed: usize, kinds: FailureKindSet },
    #[error("File collection was cancelled ({failed} path(s) could not be listed before cancellation)")]
    Cancelled { failed: usize },
}

#[derive(Debug, Clone, Default)]
pub struct TraversalResult {
    /// Every file found, including those found before a failure or cancellation elsewhere in the tree
    pub files: Vec<FileEntry>,
    /// Set when any path failed or the run was cancelled
    pub error: Option<CollectError>,
    /// The individual failures, for diagnostics
    pub failures: Vec<TraversalError>,
}

impl TraversalResult {
    /// True when every reachable path was listed
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Discards partial results when the run did not finish cleanly
    pub fn into_result(self) -> Result<Vec<FileEntry>, CollectError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.files),
        }
    }
}

/// Lists every file beneath `root`.
///
/// Always returns a [`TraversalResult`]: a failed subtree is left out and reported through `error`, and whatever was
/// found elsewhere is still returned. If `root` itself is a file, it is the only entry in the result.
///
/// Every path is fetched at most once per run. A directory listed again under a path that was already queued is
/// skipped, which keeps the run finite on namespaces that are not strictly trees.
pub async fn collect<A: MetadataApi>(api: &A, root: &RemotePath, options: CollectOptions) -> TraversalResult {
    let concurrency = options.concurrency.max(1);
    info!(root = %root, concurrency, order = options.order, "Collecting files");

    let collector = Collector::new(api, root.clone(), options.cancel);
    join_all((0..concurrency).map(|worker| collector.run_worker(worker))).await;

    let result = collector.finish(options.order);
    info!(
        root = %root,
        files = result.files.len(),
        failures = result.failures.len(),
        cancelled = matches!(result.error, Some(CollectError::Cancelled { .. })),
        "Finished collecting files"
    );
    result
}

/// State shared by the workers of one run
struct CollectState {
    queue: VecDeque<RemotePath>,
    /// Every path ever queued, so no path is fetched twice
    visited: HashSet<RemotePath>,
    /// Paths queued or in flight. The run is drained when this reaches zero.
    pending: usize,
    files: Vec<FileEntry>,
    failures: Vec<TraversalError>,
}

struct Collector<'a, A> {
    api: &'a A,
    state: Mutex<CollectState>,
    /// Signalled when paths are queued and when the run drains
    work_available: Notify,
    cancel: CancellationToken,
}

impl<'a, A: MetadataApi> Collector<'a, A> {
    fn new(api: &'a A, root: RemotePath, cancel: CancellationToken) -> Self {
        let state = CollectState {
            queue: VecDeque::from([root.clone()]),
            visited: HashSet::from([root]),
            pending: 1,
            files: vec![],
            failures: vec![],
        };

        Collector {
            api,
            state: Mutex::new(state),
            work_available: Notify::new(),
            cancel,
        }
    }

    async fn run_worker(&self, worker: usize) {
        while let Some(path) = self.next_path().await {
            debug!(worker, path = %path, "Fetching node");
            let outcome = self.api.fetch_node(&path).await;
            self.complete(path, outcome).await;
        }
    }

    /// Waits for the next queued path. Returns None once the run is drained or cancelled.
    async fn next_path(&self) -> Option<RemotePath> {
        loop {
            // Register before checking the queue so a notification sent in between is not lost
            let notified = self.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if self.cancel.is_cancelled() {
                    return None;
                }
                if let Some(path) = state.queue.pop_front() {
                    return Some(path);
                }
                if state.pending == 0 {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.cancel.cancelled() => return None,
            }
        }
    }

    /// Records the outcome of one fetch and moves the path to its terminal state
    async fn complete(&self, path: RemotePath, outcome: Result<Node, A::Error>) {
        let mut state = self.state.lock().await;
        let mut queued = 0;

        match outcome {
            Err(err) => {
                warn!(path = %path, error = %err, "Failed to fetch node");
                state.failures.push(TraversalError {
                    path,
                    kind: TraversalErrorKind::Resolution(err.to_string()),
                });
            }
            Ok(node) => {
                let node_path = node.resolved_path().cloned();
                match node_path {
                    None => {
                        warn!(path = %path, "Metadata reply has no path");
                        state.failures.push(TraversalError {
                            path,
                            kind: TraversalErrorKind::MalformedNode,
                        });
                    }
                    Some(node_path) if node.is_dir => {
                        debug!(path = %node_path, children = node.contents.len(), "Expanding directory");
                        for child in node.contents {
                            if !child.is_dir {
                                state.files.push(FileEntry::from(child));
                            } else if state.visited.insert(child.path.clone()) {
                                state.queue.push_back(child.path);
                                queued += 1;
                            } else {
                                debug!(path = %child.path, "Skipping directory that was already queued");
                            }
                        }
                    }
                    Some(node_path) => {
                        state.files.push(FileEntry::new(node_path, node.size));
                    }
                }
            }
        }

        state.pending += queued;
        state.pending -= 1;
        let drained = state.pending == 0;
        drop(state);

        if queued > 0 || drained {
            self.work_available.notify_waiters();
        }
    }

    fn finish(self, order: bool) -> TraversalResult {
        let CollectState {
            mut files,
            failures,
            pending,
            ..
        } = self.state.into_inner();

        if order {
            // Stable, so files at equal depth keep discovery order
            files.sort_by_key(|file| file.path.depth());
        }

        let error = if pending > 0 {
            Some(CollectError::Cancelled {
                failed: failures.len(),
            })
        } else if !failures.is_empty() {
            Some(CollectError::Incomplete {
                failed: failures.len(),
                kinds: failures.iter().map(|failure| failure.kind.failure_kind()).collect(),
            })
        } else {
            None
        };

        TraversalResult { files, error, failures }
    }
}
