//! Rollups over stored scan history.
//!
//! A rollup is a pure function of the results in its window, so running the
//! same window twice over the same history gives the same answer.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::ScanResult;
use crate::error::Result;
use crate::rules::Severity;
use crate::store::{ResultStore, TimeRange};

pub const DEFAULT_TOP_K: usize = 5;

/// Points deducted from a perfect score per finding of each severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 40,
            high: 20,
            medium: 10,
            low: 5,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// `100 - sum(weight * count)`, floored at zero.
    pub fn score(&self, counts: &BTreeMap<Severity, usize>) -> u32 {
        let deduction: u64 = counts
            .iter()
            .map(|(&severity, &count)| u64::from(self.weight(severity)) * count as u64)
            .sum();
        100u64.saturating_sub(deduction) as u32
    }
}

/// How often one rule fired inside a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingFrequency {
    pub rule_id: String,
    pub description: String,
    pub severity: Severity,
    pub count: usize,
}

/// Score of a single scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub resource_id: String,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rollup {
    pub resource_id: Option<String>,
    pub range: TimeRange,
    pub total_scans: usize,
    /// Every severity is present, zero when nothing fired.
    pub severity_counts: BTreeMap<Severity, usize>,
    /// Most frequent rules, count descending then rule id ascending.
    pub top_findings: Vec<FindingFrequency>,
    /// One point per scan, oldest first.
    pub trend: Vec<TrendPoint>,
}

impl Rollup {
    pub fn total_findings(&self) -> usize {
        self.severity_counts.values().sum()
    }
}

fn zeroed_counts() -> BTreeMap<Severity, usize> {
    Severity::ALL.iter().map(|&s| (s, 0)).collect()
}

fn count_severities(result: &ScanResult) -> BTreeMap<Severity, usize> {
    let mut counts = zeroed_counts();
    for finding in &result.findings {
        *counts.entry(finding.severity).or_default() += 1;
    }
    counts
}

pub struct ReportAggregator {
    store: Arc<dyn ResultStore>,
    weights: SeverityWeights,
    top_k: usize,
}

impl ReportAggregator {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self {
            store,
            weights: SeverityWeights::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_weights(mut self, weights: SeverityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn weights(&self) -> &SeverityWeights {
        &self.weights
    }

    /// Aggregate every stored scan in `range`, optionally for one resource.
    pub async fn rollup(&self, resource_id: Option<&str>, range: &TimeRange) -> Result<Rollup> {
        let results = match resource_id {
            Some(id) => self.store.query_resource(id, range).await?,
            None => self.store.query(range).await?,
        };
        let rollup = self.rollup_results(resource_id, range, &results);
        debug!(
            resource_id = resource_id.unwrap_or("*"),
            scans = rollup.total_scans,
            findings = rollup.total_findings(),
            "computed rollup"
        );
        Ok(rollup)
    }

    /// Aggregate an explicit set of results. Results outside `range` or for
    /// another resource are ignored.
    pub fn rollup_results(
        &self,
        resource_id: Option<&str>,
        range: &TimeRange,
        results: &[ScanResult],
    ) -> Rollup {
        let mut window: Vec<&ScanResult> = results
            .iter()
            .filter(|r| range.contains(r.scan_time))
            .filter(|r| resource_id.map_or(true, |id| r.resource_id == id))
            .collect();
        window.sort_by(|a, b| (a.scan_time, a.id).cmp(&(b.scan_time, b.id)));

        let mut severity_counts = zeroed_counts();
        let mut frequencies: HashMap<&str, FindingFrequency> = HashMap::new();
        let mut trend = Vec::with_capacity(window.len());

        for result in &window {
            let counts = count_severities(result);
            for (severity, count) in &counts {
                *severity_counts.entry(*severity).or_default() += count;
            }
            for finding in &result.findings {
                frequencies
                    .entry(finding.rule_id.as_str())
                    .or_insert_with(|| FindingFrequency {
                        rule_id: finding.rule_id.clone(),
                        description: finding.description.clone(),
                        severity: finding.severity,
                        count: 0,
                    })
                    .count += 1;
            }
            trend.push(TrendPoint {
                timestamp: result.scan_time,
                resource_id: result.resource_id.clone(),
                score: self.weights.score(&counts),
            });
        }

        let mut top_findings: Vec<FindingFrequency> = frequencies.into_values().collect();
        top_findings.sort_by(|a, b| {
            (Reverse(a.count), &a.rule_id).cmp(&(Reverse(b.count), &b.rule_id))
        });
        top_findings.truncate(self.top_k);

        Rollup {
            resource_id: resource_id.map(str::to_string),
            range: *range,
            total_scans: window.len(),
            severity_counts,
            top_findings,
            trend,
        }
    }
}
