use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShieldError};
use crate::report::{SeverityWeights, DEFAULT_TOP_K};
use crate::rules::policy::Policy;

pub const DEFAULT_CONFIG_FILE: &str = ".resourceshield.toml";

/// Top-level configuration from `.resourceshield.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Upper bound on a single configuration fetch.
    pub fetch_timeout_secs: u64,
    /// Worker pool size for sweeps.
    pub concurrency: usize,
    /// Pause between scheduled sweeps.
    pub sweep_interval_secs: u64,
    /// Retries for transient fetch failures. Zero disables retrying.
    pub fetch_retries: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            concurrency: 4,
            sweep_interval_secs: 3600,
            fetch_retries: 3,
        }
    }
}

impl ScanSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// JSON-lines result file.
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".resourceshield/results.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub top_k: usize,
    pub weights: SeverityWeights,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            weights: SeverityWeights::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scan.fetch_timeout_secs == 0 {
            return Err(ShieldError::Config(
                "scan.fetch_timeout_secs must be at least 1".into(),
            ));
        }
        if self.scan.sweep_interval_secs == 0 {
            return Err(ShieldError::Config(
                "scan.sweep_interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# resource-shield configuration

[policy]
# Minimum severity to fail a scan (low, medium, high, critical).
fail_on = "high"

# Rule IDs to skip entirely.
# ignore_rules = ["DDB-007"]

# Per-rule severity overrides.
# [policy.overrides]
# "STG-002" = "low"

[scan]
fetch_timeout_secs = 30
concurrency = 4
sweep_interval_secs = 3600
fetch_retries = 3

[store]
path = ".resourceshield/results.jsonl"

[report]
top_k = 5

# Points deducted from 100 per finding.
[report.weights]
critical = 40
high = 20
medium = 10
low = 5
"#
    }
}
