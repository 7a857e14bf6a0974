//! Scan engine: classify, fetch, normalize, evaluate.
//!
//! The engine never persists and never retries. It either returns a complete
//! [`ScanResult`] or an error, so nothing partial reaches a store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, ShieldError};
use crate::provider::{ConfigFetcher, FetchError, ResourceTypeClassifier};
use crate::resource::{ResourceDescriptor, ResourceType};
use crate::rules::{Finding, PolicyRegistry};

/// Default bound on a single configuration fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One point-in-time evaluation of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Time-ordered (UUIDv7) identifier.
    pub id: Uuid,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub scan_time: DateTime<Utc>,
    /// Findings in registry evaluation order.
    pub findings: Vec<Finding>,
}

impl ScanResult {
    pub fn new(descriptor: &ResourceDescriptor, findings: Vec<Finding>) -> Self {
        Self {
            id: Uuid::now_v7(),
            resource_id: descriptor.resource_id().to_string(),
            resource_type: descriptor.resource_type(),
            resource_name: descriptor.resource_name().to_string(),
            scan_time: Utc::now(),
            findings,
        }
    }
}

pub struct ScanEngine {
    registry: Arc<PolicyRegistry>,
    classifier: Arc<dyn ResourceTypeClassifier>,
    fetcher: Arc<dyn ConfigFetcher>,
    fetch_timeout: Duration,
}

impl ScanEngine {
    pub fn new(
        registry: Arc<PolicyRegistry>,
        classifier: Arc<dyn ResourceTypeClassifier>,
        fetcher: Arc<dyn ConfigFetcher>,
    ) -> Self {
        Self {
            registry,
            classifier,
            fetcher,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Scan one resource end to end.
    pub async fn scan(&self, resource_id: &str) -> Result<ScanResult> {
        let resource_type = self.classifier.classify(resource_id)?;
        if !self.registry.supports(resource_type) {
            return Err(ShieldError::unsupported(resource_id, Some(resource_type)));
        }

        let raw = self.fetch(resource_id).await?;
        let descriptor = ResourceDescriptor::normalize(resource_id, resource_type, &raw)?;
        debug!(
            resource_id,
            %resource_type,
            properties = descriptor.properties().len(),
            "normalized configuration"
        );

        let findings = self.evaluate(&descriptor);
        let result = ScanResult::new(&descriptor, findings);
        info!(
            resource_id,
            scan_id = %result.id,
            findings = result.findings.len(),
            "scan completed"
        );
        Ok(result)
    }

    /// Evaluate a fixed descriptor against the registry. Pure.
    pub fn evaluate(&self, descriptor: &ResourceDescriptor) -> Vec<Finding> {
        self.registry.evaluate(descriptor)
    }

    async fn fetch(&self, resource_id: &str) -> Result<serde_json::Value> {
        let outcome = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(resource_id))
            .await
            .unwrap_or(Err(FetchError::Timeout(self.fetch_timeout)));

        outcome.map_err(|source| {
            warn!(resource_id, error = %source, transient = source.is_transient(), "fetch failed");
            ShieldError::Fetch {
                resource_id: resource_id.into(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ArmPathClassifier, RawConfig, SnapshotProvider};
    use crate::provider::snapshot::SnapshotEntry;
    use crate::rules::{PolicyRule, RuleCategory, RuleMetadata, Severity};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const STORAGE: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/st1";
    const VM: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1";

    fn engine_with(entries: Vec<SnapshotEntry>) -> ScanEngine {
        ScanEngine::new(
            Arc::new(PolicyRegistry::with_builtin_rules().unwrap()),
            Arc::new(ArmPathClassifier),
            Arc::new(SnapshotProvider::from_entries(entries)),
        )
    }

    struct Stalled;

    #[async_trait]
    impl ConfigFetcher for Stalled {
        async fn fetch(&self, _id: &str) -> std::result::Result<RawConfig, FetchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn scan_storage_account() {
        let engine = engine_with(vec![SnapshotEntry {
            id: STORAGE.into(),
            properties: json!({
                "name": "st1",
                "publicNetworkAccess": true,
                "encryptionKeySource": "Microsoft",
            }),
        }]);

        let result = engine.scan(STORAGE).await.unwrap();
        assert_eq!(result.resource_id, STORAGE);
        assert_eq!(result.resource_type, ResourceType::StorageAccount);
        assert_eq!(result.resource_name, "st1");
        let ids: Vec<&str> = result.findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(ids, vec!["STG-001", "STG-002"]);
    }

    #[tokio::test]
    async fn fresh_ids_per_scan() {
        let engine = engine_with(vec![SnapshotEntry {
            id: STORAGE.into(),
            properties: json!({}),
        }]);
        let a = engine.scan(STORAGE).await.unwrap();
        let b = engine.scan(STORAGE).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.get_version_num(), 7);
        assert_eq!(a.findings, b.findings);
    }

    #[tokio::test]
    async fn missing_resource_is_fetch_error() {
        let engine = engine_with(vec![]);
        let err = engine.scan(STORAGE).await.unwrap_err();
        match err {
            ShieldError::Fetch {
                resource_id,
                source,
            } => {
                assert_eq!(resource_id, STORAGE);
                assert_eq!(source, FetchError::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_type_is_unsupported() {
        let engine = engine_with(vec![]);
        let err = engine
            .scan("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Web/sites/app")
            .await
            .unwrap_err();
        assert!(matches!(err, ShieldError::UnsupportedResourceType { .. }));
    }

    #[tokio::test]
    async fn type_without_rules_is_unsupported() {
        let mut registry = PolicyRegistry::new();
        registry
            .register(PolicyRule::new(
                RuleMetadata {
                    id: "ONLY-STG".into(),
                    name: "x".into(),
                    description: "x".into(),
                    recommendation: "x".into(),
                    severity: Severity::Low,
                    category: RuleCategory::Network,
                    applies_to: vec![ResourceType::StorageAccount],
                },
                |_| true,
            ))
            .unwrap();
        let engine = ScanEngine::new(
            Arc::new(registry),
            Arc::new(ArmPathClassifier),
            Arc::new(SnapshotProvider::from_entries(vec![SnapshotEntry {
                id: VM.into(),
                properties: json!({}),
            }])),
        );

        let err = engine.scan(VM).await.unwrap_err();
        assert!(matches!(err, ShieldError::UnsupportedResourceType { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn slow_fetch_times_out_as_transient_fetch_error() {
        let engine = ScanEngine::new(
            Arc::new(PolicyRegistry::with_builtin_rules().unwrap()),
            Arc::new(ArmPathClassifier),
            Arc::new(Stalled),
        )
        .with_fetch_timeout(Duration::from_millis(20));

        let err = engine.scan(STORAGE).await.unwrap_err();
        assert!(matches!(
            err,
            ShieldError::Fetch {
                source: FetchError::Timeout(_),
                ..
            }
        ));
        assert!(err.is_transient());
    }
}
