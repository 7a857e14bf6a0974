//! Collaborators the engine talks to: configuration fetchers, resource type
//! classifiers and inventory providers.
//!
//! Real deployments wrap a cloud management SDK behind these traits. The
//! crate ships an offline [`SnapshotProvider`] and an ARM-path classifier.

pub mod classifier;
pub mod retry;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Result;
use crate::resource::ResourceType;

pub use classifier::ArmPathClassifier;
pub use retry::{RetryConfig, RetryingFetcher};
pub use snapshot::SnapshotProvider;

/// Raw configuration as returned by a fetcher, before normalization.
pub type RawConfig = serde_json::Value;

/// Why a configuration fetch failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("resource not found")]
    NotFound,

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed configuration: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Timeouts and transport hiccups may clear up; the rest will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }
}

/// Fetches the current configuration of one resource.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch(&self, resource_id: &str) -> std::result::Result<RawConfig, FetchError>;
}

#[async_trait]
impl<T: ConfigFetcher + ?Sized> ConfigFetcher for Arc<T> {
    async fn fetch(&self, resource_id: &str) -> std::result::Result<RawConfig, FetchError> {
        (**self).fetch(resource_id).await
    }
}

/// Maps a resource id to its type, or fails with `UnsupportedResourceType`.
pub trait ResourceTypeClassifier: Send + Sync {
    fn classify(&self, resource_id: &str) -> Result<ResourceType>;
}

/// Lists the resource ids a batch sweep should cover.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<String>>;
}
