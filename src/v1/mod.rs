pub mod client;
pub mod collector;
#[cfg(feature = "mock_client")]
pub mod mock_client;
pub mod model;

pub use client::MetadataApi;
pub use collector::{CollectError, CollectOptions, TraversalResult, collect};
pub use model::{ChildEntry, FileEntry, Node};
