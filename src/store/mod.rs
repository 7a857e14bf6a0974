//! Append-only scan history.
//!
//! Results are partitioned by `resource_id` and ordered by `(scan_time, id)`
//! inside a partition. Nothing is ever updated or deleted.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::ScanResult;
use crate::error::{Result, ShieldError};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Whether an append stored a new entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    Inserted,
    /// A result with this id was already stored; nothing changed.
    Duplicate,
}

/// Inclusive `[start, end]` window over `scan_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(ShieldError::Config(format!(
                "time range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The window ending now and reaching back `span`.
    pub fn last(span: Duration) -> Self {
        let end = Utc::now();
        Self {
            start: end - span,
            end,
        }
    }

    /// Explicit bounds where given. A missing `until` is now, a missing
    /// `since` reaches back `span` from the end.
    pub fn window(
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        span: Duration,
    ) -> Result<Self> {
        let end = until.unwrap_or_else(Utc::now);
        let start = since.unwrap_or(end - span);
        Self::new(start, end)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Durable collection of scan results.
///
/// Implementations synchronize internally; callers may append from many
/// tasks at once. A missing resource is an empty answer, never an error.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store a result. Re-appending an existing `result.id` is a no-op.
    async fn append(&self, result: &ScanResult) -> Result<AppendOutcome>;

    /// Most recent result for a resource.
    async fn latest(&self, resource_id: &str) -> Result<Option<ScanResult>>;

    /// Up to `limit` results for a resource, newest first.
    async fn history(&self, resource_id: &str, limit: usize) -> Result<Vec<ScanResult>>;

    /// All results whose `scan_time` falls in `range`, oldest first.
    async fn query(&self, range: &TimeRange) -> Result<Vec<ScanResult>>;

    /// Results for one resource whose `scan_time` falls in `range`, oldest
    /// first. Reads only that resource's partition.
    async fn query_resource(&self, resource_id: &str, range: &TimeRange) -> Result<Vec<ScanResult>>;

    /// Point lookup by partition and id.
    async fn get(&self, resource_id: &str, id: &Uuid) -> Result<Option<ScanResult>>;
}
