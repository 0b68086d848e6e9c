//! Recursive file listing for remote storage namespaces that only expose a per-path metadata call.
//!
//! The [`v1::collector::collect`] entry point walks a directory through a [`v1::client::MetadataApi`] with bounded
//! concurrency and returns every file found, along with an aggregate error when part of the tree could not be listed.

pub mod common;
pub mod v1;
