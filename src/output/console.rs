use crate::engine::ScanResult;
use crate::report::Rollup;
use crate::rules::policy::PolicyVerdict;
use crate::rules::{Finding, Severity};
use crate::scheduler::SweepSummary;

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "[CRITICAL]",
        Severity::High => "[HIGH]    ",
        Severity::Medium => "[MEDIUM]  ",
        Severity::Low => "[LOW]     ",
    }
}

/// Render a scan result, most severe findings first.
pub fn render_scan(result: &ScanResult, verdict: &PolicyVerdict) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "\n  {} ({})\n  {}\n",
        result.resource_name, result.resource_type, result.resource_id
    ));
    output.push_str(&format!(
        "  scanned {} (scan {})\n",
        result.scan_time.format("%Y-%m-%d %H:%M:%S UTC"),
        result.id
    ));

    if result.findings.is_empty() {
        output.push_str("\n  No compliance findings.\n\n");
    } else {
        // Stable sort keeps registry order within a severity.
        let mut sorted: Vec<&Finding> = result.findings.iter().collect();
        sorted.sort_by(|a, b| b.severity.cmp(&a.severity));

        output.push_str(&format!("\n  {} finding(s):\n\n", result.findings.len()));
        for finding in sorted {
            output.push_str(&format!(
                "  {} {} {}\n",
                severity_tag(finding.severity),
                finding.rule_id,
                finding.description
            ));
            output.push_str(&format!("           fix: {}\n\n", finding.recommendation));
        }
    }

    let status = if verdict.pass { "PASS" } else { "FAIL" };
    output.push_str(&format!(
        "  Result: {} (threshold: {}, highest: {})\n\n",
        status,
        verdict.fail_threshold,
        verdict
            .highest_severity
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".into()),
    ));

    output
}

pub fn render_sweep(summary: &SweepSummary) -> String {
    let mut output = format!(
        "\n  Sweep {}: {}\n  {} succeeded, {} failed, {} skipped\n",
        summary.run_id,
        summary.state,
        summary.succeeded.len(),
        summary.failed.len(),
        summary.skipped.len(),
    );

    if let Some(err) = &summary.inventory_error {
        output.push_str(&format!("\n  inventory unavailable: {err}\n"));
    }
    if !summary.failed.is_empty() {
        output.push('\n');
        for failure in &summary.failed {
            output.push_str(&format!(
                "  [FAILED]   {}\n           {}{}\n",
                failure.resource_id,
                failure.reason,
                if failure.transient { " (transient)" } else { "" }
            ));
        }
    }
    if summary.cancelled {
        output.push_str("\n  Sweep was stopped before all resources were scanned.\n");
    }
    output.push('\n');
    output
}

pub fn render_history(resource_id: &str, results: &[ScanResult]) -> String {
    if results.is_empty() {
        return format!("\n  No scans recorded for {resource_id}.\n\n");
    }

    let mut output = format!("\n  History for {resource_id}:\n\n");
    output.push_str(&format!(
        "  {:<24} {:<38} {:>8} HIGHEST\n",
        "SCANNED", "SCAN ID", "FINDINGS"
    ));
    for result in results {
        let highest = result
            .findings
            .iter()
            .map(|f| f.severity)
            .max()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        output.push_str(&format!(
            "  {:<24} {:<38} {:>8} {}\n",
            result.scan_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            result.id.to_string(),
            result.findings.len(),
            highest
        ));
    }
    output.push('\n');
    output
}

pub fn render_rollup(rollup: &Rollup) -> String {
    let scope = rollup.resource_id.as_deref().unwrap_or("all resources");
    let mut output = format!(
        "\n  Report for {} ({} to {})\n  {} scan(s), {} finding(s)\n\n",
        scope,
        rollup.range.start.format("%Y-%m-%d %H:%M"),
        rollup.range.end.format("%Y-%m-%d %H:%M"),
        rollup.total_scans,
        rollup.total_findings(),
    );

    for (severity, count) in rollup.severity_counts.iter().rev() {
        output.push_str(&format!("  {} {}\n", severity_tag(*severity), count));
    }

    if !rollup.top_findings.is_empty() {
        output.push_str("\n  Top findings:\n");
        for (rank, f) in rollup.top_findings.iter().enumerate() {
            output.push_str(&format!(
                "  {:>2}. {:<10} x{:<4} {}\n",
                rank + 1,
                f.rule_id,
                f.count,
                f.description
            ));
        }
    }

    if let (Some(first), Some(last)) = (rollup.trend.first(), rollup.trend.last()) {
        output.push_str(&format!(
            "\n  Score: {} -> {} over {} scan(s)\n",
            first.score,
            last.score,
            rollup.trend.len()
        ));
    }
    output.push('\n');
    output
}
