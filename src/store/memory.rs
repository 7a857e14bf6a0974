use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::engine::ScanResult;
use crate::error::Result;

use super::{AppendOutcome, ResultStore, TimeRange};

/// In-memory index shared by the store backends.
#[derive(Debug, Default)]
pub(crate) struct Partitions {
    by_resource: HashMap<String, Vec<ScanResult>>,
    ids: HashSet<Uuid>,
}

impl Partitions {
    pub(crate) fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    pub(crate) fn insert(&mut self, result: ScanResult) -> AppendOutcome {
        if !self.ids.insert(result.id) {
            return AppendOutcome::Duplicate;
        }
        let partition = self.by_resource.entry(result.resource_id.clone()).or_default();
        let key = (result.scan_time, result.id);
        let at = partition.partition_point(|r| (r.scan_time, r.id) <= key);
        partition.insert(at, result);
        AppendOutcome::Inserted
    }

    pub(crate) fn latest(&self, resource_id: &str) -> Option<ScanResult> {
        self.by_resource
            .get(resource_id)
            .and_then(|p| p.last())
            .cloned()
    }

    pub(crate) fn history(&self, resource_id: &str, limit: usize) -> Vec<ScanResult> {
        self.by_resource
            .get(resource_id)
            .map(|p| p.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn query(&self, range: &TimeRange) -> Vec<ScanResult> {
        let mut hits: Vec<ScanResult> = self
            .by_resource
            .values()
            .flat_map(|p| p.iter().filter(|r| range.contains(r.scan_time)))
            .cloned()
            .collect();
        hits.sort_by(|a, b| (a.scan_time, a.id).cmp(&(b.scan_time, b.id)));
        hits
    }

    pub(crate) fn query_resource(&self, resource_id: &str, range: &TimeRange) -> Vec<ScanResult> {
        let Some(partition) = self.by_resource.get(resource_id) else {
            return Vec::new();
        };
        let lo = partition.partition_point(|r| r.scan_time < range.start);
        let hi = partition.partition_point(|r| r.scan_time <= range.end);
        partition[lo..hi.max(lo)].to_vec()
    }

    pub(crate) fn get(&self, resource_id: &str, id: &Uuid) -> Option<ScanResult> {
        self.by_resource
            .get(resource_id)
            .and_then(|p| p.iter().find(|r| &r.id == id))
            .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Process-local store. Useful for tests and single-shot runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Partitions>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn append(&self, result: &ScanResult) -> Result<AppendOutcome> {
        let outcome = self.inner.write().insert(result.clone());
        if outcome == AppendOutcome::Duplicate {
            tracing::debug!(scan_id = %result.id, "duplicate append ignored");
        }
        Ok(outcome)
    }

    async fn latest(&self, resource_id: &str) -> Result<Option<ScanResult>> {
        Ok(self.inner.read().latest(resource_id))
    }

    async fn history(&self, resource_id: &str, limit: usize) -> Result<Vec<ScanResult>> {
        Ok(self.inner.read().history(resource_id, limit))
    }

    async fn query(&self, range: &TimeRange) -> Result<Vec<ScanResult>> {
        Ok(self.inner.read().query(range))
    }

    async fn query_resource(&self, resource_id: &str, range: &TimeRange) -> Result<Vec<ScanResult>> {
        Ok(self.inner.read().query_resource(resource_id, range))
    }

    async fn get(&self, resource_id: &str, id: &Uuid) -> Result<Option<ScanResult>> {
        Ok(self.inner.read().get(resource_id, id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::resource::ResourceType;
    use crate::rules::{Finding, RuleCategory, Severity};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    pub(crate) fn result_at(resource_id: &str, at: DateTime<Utc>, severities: &[Severity]) -> ScanResult {
        ScanResult {
            id: Uuid::now_v7(),
            resource_id: resource_id.into(),
            resource_type: ResourceType::StorageAccount,
            resource_name: resource_id.rsplit('/').next().unwrap_or_default().into(),
            scan_time: at,
            findings: severities
                .iter()
                .enumerate()
                .map(|(i, &severity)| Finding {
                    rule_id: format!("R-{i}"),
                    severity,
                    category: RuleCategory::Network,
                    description: format!("finding {i}"),
                    recommendation: "fix".into(),
                })
                .collect(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn append_then_latest_round_trips() {
        let store = MemoryStore::new();
        let r = result_at("a", t0(), &[Severity::High]);
        assert_eq!(store.append(&r).await.unwrap(), AppendOutcome::Inserted);
        assert_eq!(store.latest("a").await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn duplicate_id_not_stored_twice() {
        let store = MemoryStore::new();
        let r = result_at("a", t0(), &[]);
        store.append(&r).await.unwrap();
        assert_eq!(store.append(&r).await.unwrap(), AppendOutcome::Duplicate);
        assert_eq!(store.history("a", 10).await.unwrap().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn history_newest_first_and_limited() {
        let store = MemoryStore::new();
        // Appended out of order on purpose.
        for offset in [2, 0, 3, 1] {
            store
                .append(&result_at("a", t0() + Duration::minutes(offset), &[]))
                .await
                .unwrap();
        }
        let times: Vec<_> = store
            .history("a", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.scan_time)
            .collect();
        assert_eq!(
            times,
            vec![
                t0() + Duration::minutes(3),
                t0() + Duration::minutes(2),
                t0() + Duration::minutes(1)
            ]
        );
    }

    #[tokio::test]
    async fn unknown_resource_is_empty_not_error() {
        let store = MemoryStore::new();
        assert_eq!(store.latest("nope").await.unwrap(), None);
        assert!(store.history("nope", 5).await.unwrap().is_empty());
        assert_eq!(store.get("nope", &Uuid::now_v7()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_is_inclusive_across_partitions() {
        let store = MemoryStore::new();
        let inside_a = result_at("a", t0(), &[]);
        let inside_b = result_at("b", t0() + Duration::hours(1), &[]);
        let outside = result_at("a", t0() + Duration::hours(2), &[]);
        for r in [&outside, &inside_b, &inside_a] {
            store.append(r).await.unwrap();
        }

        let range = TimeRange::new(t0(), t0() + Duration::hours(1)).unwrap();
        let hits = store.query(&range).await.unwrap();
        assert_eq!(hits, vec![inside_a, inside_b]);
    }

    #[tokio::test]
    async fn query_resource_reads_one_partition_inclusively() {
        let store = MemoryStore::new();
        let at_start = result_at("a", t0(), &[]);
        let at_end = result_at("a", t0() + Duration::hours(1), &[]);
        let after = result_at("a", t0() + Duration::hours(2), &[]);
        let other = result_at("b", t0(), &[]);
        for r in [&after, &at_end, &other, &at_start] {
            store.append(r).await.unwrap();
        }

        let range = TimeRange::new(t0(), t0() + Duration::hours(1)).unwrap();
        assert_eq!(
            store.query_resource("a", &range).await.unwrap(),
            vec![at_start, at_end]
        );
        assert!(store.query_resource("missing", &range).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let r = result_at(&format!("res-{}", i % 4), t0() + Duration::seconds(i), &[]);
                store.append(&r).await.unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), AppendOutcome::Inserted);
        }
        assert_eq!(store.len(), 32);
        assert_eq!(store.history("res-0", 100).await.unwrap().len(), 8);
    }
}
