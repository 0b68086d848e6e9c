// == Std
use std::{error::Error, sync::Arc};

// == Internal crates
use super::model::Node;
use crate::common::RemotePath;

/// Access to the metadata endpoint of the remote storage service.
///
/// Implementations own authentication, URL construction and transport retries. `fetch_node` must describe `path` and,
/// for directories, list its immediate children. A missing or inaccessible path is reported as an error. The collector
/// calls this concurrently, up to its configured concurrency.
pub trait MetadataApi {
    type Error: Error + Send + Sync + 'static;

    fn fetch_node(&self, path: &RemotePath) -> impl Future<Output = Result<Node, Self::Error>> + Send;
}

impl<T: MetadataApi + Sync> MetadataApi for &T {
    type Error = T::Error;

    fn fetch_node(&self, path: &RemotePath) -> impl Future<Output = Result<Node, Self::Error>> + Send {
        (**self).fetch_node(path)
    }
}

impl<T: MetadataApi + Send + Sync> MetadataApi for Arc<T> {
    type Error = T::Error;

    fn fetch_node(&self, path: &RemotePath) -> impl Future<Output = Result<Node, Self::Error>> + Send {
        self.as_ref().fetch_node(path)
    }
}
