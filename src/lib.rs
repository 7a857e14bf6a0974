//! ResourceShield: policy-based compliance scanner for cloud resources.
//!
//! Fetches resource configurations, evaluates them against a registry of
//! declarative policy rules, keeps an append-only history of scan results
//! and rolls that history up into severity counts, top findings and score
//! trends.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use resourceshield::config::Config;
//! use resourceshield::provider::SnapshotProvider;
//! use resourceshield::store::MemoryStore;
//! use resourceshield::ScanContext;
//!
//! # async fn run() -> resourceshield::error::Result<()> {
//! let snapshot = Arc::new(SnapshotProvider::load(Path::new("snapshot.json"))?);
//! let ctx = ScanContext::new(Config::default(), snapshot, Arc::new(MemoryStore::new()))?;
//! let report = ctx.scan("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/st1").await?;
//! println!("Pass: {}, Findings: {}", report.verdict.pass, report.result.findings.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod provider;
pub mod report;
pub mod resource;
pub mod rules;
pub mod scheduler;
pub mod store;

use std::sync::Arc;

use config::Config;
use engine::{ScanEngine, ScanResult};
use error::Result;
use output::OutputFormat;
use provider::{ArmPathClassifier, ConfigFetcher, InventoryProvider, RetryConfig, RetryingFetcher};
use report::{ReportAggregator, Rollup};
use rules::policy::{Policy, PolicyVerdict};
use rules::PolicyRegistry;
use scheduler::{ScanScheduler, StopSignal, SweepSummary};
use store::{FileStore, ResultStore, TimeRange};

/// One scan plus the policy decision on its findings.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub result: ScanResult,
    pub verdict: PolicyVerdict,
}

/// Everything a scan run needs, wired from one [`Config`].
pub struct ScanContext {
    policy: Policy,
    config: Config,
    scheduler: ScanScheduler,
    aggregator: ReportAggregator,
    store: Arc<dyn ResultStore>,
}

impl ScanContext {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn ConfigFetcher>,
        store: Arc<dyn ResultStore>,
    ) -> Result<Self> {
        let registry = Arc::new(PolicyRegistry::from_policy(&config.policy)?);

        let fetcher: Arc<dyn ConfigFetcher> = if config.scan.fetch_retries > 0 {
            Arc::new(RetryingFetcher::new(
                fetcher,
                RetryConfig {
                    max_retries: config.scan.fetch_retries,
                    ..RetryConfig::default()
                },
            ))
        } else {
            fetcher
        };

        let engine = ScanEngine::new(registry, Arc::new(ArmPathClassifier), fetcher)
            .with_fetch_timeout(config.scan.fetch_timeout());
        let scheduler = ScanScheduler::new(Arc::new(engine), store.clone())
            .with_concurrency(config.scan.concurrency);
        let aggregator = ReportAggregator::new(store.clone())
            .with_weights(config.report.weights)
            .with_top_k(config.report.top_k);

        Ok(Self {
            policy: config.policy.clone(),
            config,
            scheduler,
            aggregator,
            store,
        })
    }

    /// Wire a context around the durable store at `config.store.path`.
    pub fn open(config: Config, fetcher: Arc<dyn ConfigFetcher>) -> Result<Self> {
        let store = Arc::new(FileStore::open(&config.store.path)?);
        Self::new(config, fetcher, store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &PolicyRegistry {
        self.scheduler.engine().registry()
    }

    /// Scan one resource, persist the result and judge it against the policy.
    pub async fn scan(&self, resource_id: &str) -> Result<ScanReport> {
        let result = self.scheduler.scan_now(resource_id).await?;
        let verdict = self.policy.evaluate(&result.findings);
        Ok(ScanReport { result, verdict })
    }

    pub async fn sweep(&self, inventory: &dyn InventoryProvider, stop: &StopSignal) -> SweepSummary {
        self.scheduler.sweep(inventory, stop).await
    }

    /// Sweep on the configured interval until stopped.
    pub async fn watch(
        &self,
        inventory: &dyn InventoryProvider,
        stop: &StopSignal,
        max_runs: Option<usize>,
    ) -> Vec<SweepSummary> {
        self.scheduler
            .run_periodic(inventory, self.config.scan.sweep_interval(), stop, max_runs)
            .await
    }

    pub async fn history(&self, resource_id: &str, limit: usize) -> Result<Vec<ScanResult>> {
        self.store.history(resource_id, limit).await
    }

    pub async fn latest(&self, resource_id: &str) -> Result<Option<ScanResult>> {
        self.store.latest(resource_id).await
    }

    pub async fn report(&self, resource_id: Option<&str>, range: &TimeRange) -> Result<Rollup> {
        self.aggregator.rollup(resource_id, range).await
    }
}

/// Render a scan report in the specified format.
pub fn render_report(report: &ScanReport, format: OutputFormat) -> Result<String> {
    output::render_scan(&report.result, &report.verdict, format)
}
