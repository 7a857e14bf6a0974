use serde::Serialize;

use crate::engine::ScanResult;
use crate::error::Result;
use crate::rules::policy::PolicyVerdict;

#[derive(Serialize)]
struct JsonScanReport<'a> {
    result: &'a ScanResult,
    verdict: &'a PolicyVerdict,
}

/// Render a scan result and its verdict as a JSON report.
pub fn render_scan(result: &ScanResult, verdict: &PolicyVerdict) -> Result<String> {
    render(&JsonScanReport { result, verdict })
}

/// Pretty-printed JSON for any report value.
pub fn render<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let json = serde_json::to_string_pretty(value)?;
    Ok(json)
}
