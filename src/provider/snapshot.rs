use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{ConfigFetcher, FetchError, InventoryProvider, RawConfig};

/// One resource captured in a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: String,
    #[serde(default = "empty_object")]
    pub properties: RawConfig,
}

fn empty_object() -> RawConfig {
    RawConfig::Object(Default::default())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    resources: Vec<SnapshotEntry>,
}

/// Offline collaborator backed by a JSON export of resource configurations:
///
/// ```json
/// { "resources": [ { "id": "/subscriptions/...", "properties": { ... } } ] }
/// ```
///
/// Serves both as the config fetcher and the sweep inventory.
#[derive(Debug, Default)]
pub struct SnapshotProvider {
    order: Vec<String>,
    configs: HashMap<String, RawConfig>,
}

impl SnapshotProvider {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: SnapshotFile = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            resources = file.resources.len(),
            "loaded snapshot"
        );
        Ok(Self::from_entries(file.resources))
    }

    /// Later entries with the same id replace earlier ones; inventory order
    /// follows first appearance.
    pub fn from_entries(entries: impl IntoIterator<Item = SnapshotEntry>) -> Self {
        let mut provider = Self::default();
        for entry in entries {
            if !provider.configs.contains_key(&entry.id) {
                provider.order.push(entry.id.clone());
            }
            provider.configs.insert(entry.id, entry.properties);
        }
        provider
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[async_trait]
impl ConfigFetcher for SnapshotProvider {
    async fn fetch(&self, resource_id: &str) -> std::result::Result<RawConfig, FetchError> {
        self.configs
            .get(resource_id)
            .cloned()
            .ok_or(FetchError::NotFound)
    }
}

#[async_trait]
impl InventoryProvider for SnapshotProvider {
    async fn list_resources(&self) -> Result<Vec<String>> {
        Ok(self.order.clone())
    }
}
