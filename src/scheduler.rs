//! Scan triggering: on-demand scans and batch sweeps over an inventory.
//!
//! A sweep scans every resource independently on a bounded worker pool.
//! Per-resource failures are recorded in the summary and never abort the
//! sweep. Cancellation is cooperative and only takes effect between
//! resources; a scan already in flight runs to completion.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{ScanEngine, ScanResult};
use crate::error::{Result, ShieldError};
use crate::provider::InventoryProvider;
use crate::store::{AppendOutcome, ResultStore};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Lifecycle of one scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    /// At least one resource failed and at least one succeeded.
    CompletedWithErrors,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed
        )
    }

    fn settle(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => Self::Completed,
            (0, _) => Self::Failed,
            _ => Self::CompletedWithErrors,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed with errors"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One resource that could not be scanned or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub resource_id: String,
    /// Error kind tag, e.g. `fetch_error`.
    pub kind: String,
    pub reason: String,
    pub transient: bool,
}

impl SweepFailure {
    fn from_error(resource_id: &str, err: &ShieldError) -> Self {
        Self {
            resource_id: resource_id.into(),
            kind: err.kind().into(),
            reason: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// Per-run report of a batch sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSummary {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Inventory order.
    pub succeeded: Vec<String>,
    /// Inventory order.
    pub failed: Vec<SweepFailure>,
    /// Resources never started because the sweep was stopped.
    pub skipped: Vec<String>,
    pub cancelled: bool,
    /// Set when the inventory itself could not be listed.
    pub inventory_error: Option<String>,
}

impl SweepSummary {
    fn pending() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            state: RunState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
            inventory_error: None,
        }
    }

    fn transition(&mut self, next: RunState) {
        info!(run_id = %self.run_id, from = %self.state, to = %next, "sweep state");
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Cooperative stop flag for sweeps, optionally with a deadline.
///
/// Clones share the same flag.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            deadline: None,
        }
    }

    /// A signal that also trips once `after` has elapsed.
    pub fn with_deadline(after: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + after),
            ..Self::new()
        }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the signal trips.
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        let flag = rx.wait_for(|stopped| *stopped);
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flag => {}
                    _ = tokio::time::sleep_until(deadline.into()) => {}
                }
            }
            None => {
                let _ = flag.await;
            }
        }
    }
}

pub struct ScanScheduler {
    engine: Arc<ScanEngine>,
    store: Arc<dyn ResultStore>,
    concurrency: usize,
}

impl ScanScheduler {
    pub fn new(engine: Arc<ScanEngine>, store: Arc<dyn ResultStore>) -> Self {
        Self {
            engine,
            store,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Worker pool size for sweeps. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn engine(&self) -> &ScanEngine {
        &self.engine
    }

    /// Scan one resource and persist the result. Failures propagate.
    pub async fn scan_now(&self, resource_id: &str) -> Result<ScanResult> {
        scan_and_store(&self.engine, self.store.as_ref(), resource_id).await
    }

    /// Sweep every resource the inventory lists.
    pub async fn sweep(&self, inventory: &dyn InventoryProvider, stop: &StopSignal) -> SweepSummary {
        let mut summary = SweepSummary::pending();
        summary.transition(RunState::Running);

        match inventory.list_resources().await {
            Ok(ids) => self.scan_all(ids, stop, summary).await,
            Err(e) => {
                warn!(run_id = %summary.run_id, error = %e, "inventory listing failed");
                summary.inventory_error = Some(e.to_string());
                summary.transition(RunState::Failed);
                summary
            }
        }
    }

    /// Sweep an explicit list of resource ids.
    pub async fn sweep_resources(&self, resource_ids: Vec<String>, stop: &StopSignal) -> SweepSummary {
        let mut summary = SweepSummary::pending();
        summary.transition(RunState::Running);
        self.scan_all(resource_ids, stop, summary).await
    }

    /// Timer-triggered sweeps: one immediately, then every `interval`, until
    /// the signal trips or `max_runs` sweeps have completed.
    pub async fn run_periodic(
        &self,
        inventory: &dyn InventoryProvider,
        interval: Duration,
        stop: &StopSignal,
        max_runs: Option<usize>,
    ) -> Vec<SweepSummary> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut summaries = Vec::new();

        loop {
            if max_runs.is_some_and(|max| summaries.len() >= max) {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.stopped() => break,
            }
            if stop.is_stopped() {
                break;
            }
            let summary = self.sweep(inventory, stop).await;
            info!(
                run_id = %summary.run_id,
                state = %summary.state,
                succeeded = summary.succeeded_count(),
                failed = summary.failed_count(),
                "scheduled sweep finished"
            );
            summaries.push(summary);
        }

        summaries
    }

    async fn scan_all(
        &self,
        resource_ids: Vec<String>,
        stop: &StopSignal,
        mut summary: SweepSummary,
    ) -> SweepSummary {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut outcomes: Vec<(usize, String, Result<ScanResult>)> = Vec::new();
        let mut started: Vec<(usize, String)> = Vec::new();

        let mut pending = resource_ids.into_iter().enumerate();
        while let Some((index, resource_id)) = pending.next() {
            // Check again after waiting for a slot: the stop may have
            // arrived while the pool was full.
            let permit = if stop.is_stopped() {
                None
            } else {
                let permit = permits.clone().acquire_owned().await.ok();
                permit.filter(|_| !stop.is_stopped())
            };
            let Some(permit) = permit else {
                summary.cancelled = true;
                summary.skipped.push(resource_id);
                summary.skipped.extend(pending.by_ref().map(|(_, id)| id));
                break;
            };

            started.push((index, resource_id.clone()));
            let engine = self.engine.clone();
            let store = self.store.clone();
            tasks.spawn(async move {
                let outcome = scan_and_store(&engine, store.as_ref(), &resource_id).await;
                drop(permit);
                (index, resource_id, outcome)
            });
        }

        let mut aborted = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    aborted += 1;
                    warn!(run_id = %summary.run_id, error = %e, "scan task aborted");
                }
            }
        }

        // A task that panicked never reported back; record it as failed.
        if aborted > 0 {
            let reported: HashSet<usize> = outcomes.iter().map(|(index, _, _)| *index).collect();
            for (index, resource_id) in started {
                if !reported.contains(&index) {
                    let err = ShieldError::Internal("scan task panicked or was aborted".into());
                    outcomes.push((index, resource_id, Err(err)));
                }
            }
        }

        outcomes.sort_by_key(|(index, _, _)| *index);
        for (_, resource_id, outcome) in outcomes {
            match outcome {
                Ok(_) => summary.succeeded.push(resource_id),
                Err(e) => summary
                    .failed
                    .push(SweepFailure::from_error(&resource_id, &e)),
            }
        }

        if summary.cancelled {
            warn!(
                run_id = %summary.run_id,
                skipped = summary.skipped.len(),
                "sweep stopped early"
            );
        }
        summary.transition(RunState::settle(summary.succeeded.len(), summary.failed.len()));
        summary
    }
}

async fn scan_and_store(
    engine: &ScanEngine,
    store: &dyn ResultStore,
    resource_id: &str,
) -> Result<ScanResult> {
    let result = engine.scan(resource_id).await?;
    if store.append(&result).await? == AppendOutcome::Duplicate {
        warn!(resource_id, scan_id = %result.id, "scan result already stored");
    }
    Ok(result)
}
