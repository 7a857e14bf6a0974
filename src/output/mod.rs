pub mod console;
pub mod json;

use serde::{Deserialize, Serialize};

use crate::engine::ScanResult;
use crate::error::Result;
use crate::report::Rollup;
use crate::rules::policy::PolicyVerdict;
use crate::scheduler::SweepSummary;

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
}

impl OutputFormat {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "console" | "text" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Render one scan result with its policy verdict.
pub fn render_scan(result: &ScanResult, verdict: &PolicyVerdict, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_scan(result, verdict)),
        OutputFormat::Json => json::render_scan(result, verdict),
    }
}

pub fn render_sweep(summary: &SweepSummary, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_sweep(summary)),
        OutputFormat::Json => json::render(summary),
    }
}

pub fn render_history(resource_id: &str, results: &[ScanResult], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_history(resource_id, results)),
        OutputFormat::Json => json::render(&results),
    }
}

pub fn render_rollup(rollup: &Rollup, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Console => Ok(console::render_rollup(rollup)),
        OutputFormat::Json => json::render(rollup),
    }
}
