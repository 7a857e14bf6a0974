use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use resourceshield::config::{Config, DEFAULT_CONFIG_FILE};
use resourceshield::error::ShieldError;
use resourceshield::output::{self, OutputFormat};
use resourceshield::provider::SnapshotProvider;
use resourceshield::rules::{PolicyRegistry, Severity};
use resourceshield::scheduler::{RunState, StopSignal, SweepSummary};
use resourceshield::store::TimeRange;
use resourceshield::ScanContext;

#[derive(Parser)]
#[command(
    name = "resourceshield",
    about = "Policy-based compliance scanner for cloud resources",
    version,
    author
)]
struct Cli {
    /// Config file path
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a single resource and record the result
    Scan {
        /// Full resource id
        resource_id: String,

        /// JSON snapshot of resource configurations
        #[arg(long, env = "RESOURCESHIELD_SNAPSHOT")]
        snapshot: PathBuf,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Minimum severity to fail (low, medium, high, critical)
        #[arg(long)]
        fail_on: Option<String>,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Scan every resource in the snapshot
    Sweep {
        /// JSON snapshot of resource configurations
        #[arg(long, env = "RESOURCESHIELD_SNAPSHOT")]
        snapshot: PathBuf,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Stop starting new scans after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Keep sweeping on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Show recorded scans for a resource, newest first
    History {
        resource_id: String,

        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,
    },

    /// Summarize recorded scans over a time window
    Report {
        /// Restrict to one resource
        #[arg(long)]
        resource_id: Option<String>,

        /// Window length in hours, used for whichever bound is not given
        #[arg(long, default_value_t = 24 * 7)]
        hours: i64,

        /// Window start, RFC 3339 (e.g. 2026-01-01T00:00:00Z)
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Window end, RFC 3339; defaults to now
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,
    },

    /// List all available policy rules
    ListRules {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,
    },

    /// Generate a starter .resourceshield.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            resource_id,
            snapshot,
            format,
            fail_on,
            output,
        } => cmd_scan(&cli.config, resource_id, snapshot, format, fail_on, output).await,
        Commands::Sweep {
            snapshot,
            format,
            deadline_secs,
            watch,
        } => cmd_sweep(&cli.config, snapshot, format, deadline_secs, watch).await,
        Commands::History {
            resource_id,
            limit,
            format,
        } => cmd_history(&cli.config, resource_id, limit, format).await,
        Commands::Report {
            resource_id,
            hours,
            since,
            until,
            format,
        } => cmd_report(&cli.config, resource_id, hours, since, until, format).await,
        Commands::ListRules { format } => cmd_list_rules(&cli.config, format),
        Commands::Init { force } => cmd_init(&cli.config, force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn parse_format(format_str: &str) -> OutputFormat {
    OutputFormat::from_str_lenient(format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    })
}

/// Context backed by the configured result store and a snapshot, if given.
fn open_context(config_path: &Path, snapshot: Option<&Path>) -> Result<(ScanContext, Arc<SnapshotProvider>), ShieldError> {
    let config = Config::load(config_path)?;
    let provider = match snapshot {
        Some(path) => Arc::new(SnapshotProvider::load(path)?),
        None => Arc::new(SnapshotProvider::default()),
    };
    let ctx = ScanContext::open(config, provider.clone())?;
    Ok((ctx, provider))
}

async fn cmd_scan(
    config_path: &Path,
    resource_id: String,
    snapshot: PathBuf,
    format_str: String,
    fail_on_str: Option<String>,
    output_path: Option<PathBuf>,
) -> Result<i32, ShieldError> {
    let format = parse_format(&format_str);

    let fail_on = fail_on_str.and_then(|s| {
        let sev = Severity::from_str_lenient(&s);
        if sev.is_none() {
            eprintln!("Warning: unknown severity '{}', using config default", s);
        }
        sev
    });

    let (ctx, _) = open_context(config_path, Some(&snapshot))?;
    let mut report = ctx.scan(&resource_id).await?;
    if let Some(fail_on) = fail_on {
        let mut policy = ctx.config().policy.clone();
        policy.fail_on = fail_on;
        report.verdict = policy.evaluate(&report.result.findings);
    }
    let rendered = resourceshield::render_report(&report, format)?;

    match output_path {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = pass, 1 = findings above threshold
    Ok(if report.verdict.pass { 0 } else { 1 })
}

async fn cmd_sweep(
    config_path: &Path,
    snapshot: PathBuf,
    format_str: String,
    deadline_secs: Option<u64>,
    watch: bool,
) -> Result<i32, ShieldError> {
    let format = parse_format(&format_str);
    let (ctx, inventory) = open_context(config_path, Some(&snapshot))?;

    let stop = match deadline_secs {
        Some(secs) => StopSignal::with_deadline(std::time::Duration::from_secs(secs)),
        None => StopSignal::new(),
    };
    let interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.stop();
        }
    });

    let summaries: Vec<SweepSummary> = if watch {
        ctx.watch(inventory.as_ref(), &stop, None).await
    } else {
        vec![ctx.sweep(inventory.as_ref(), &stop).await]
    };

    for summary in &summaries {
        print!("{}", output::render_sweep(summary, format)?);
    }

    let clean = summaries
        .last()
        .map_or(true, |s| s.state == RunState::Completed);
    Ok(if clean { 0 } else { 1 })
}

async fn cmd_history(
    config_path: &Path,
    resource_id: String,
    limit: usize,
    format_str: String,
) -> Result<i32, ShieldError> {
    let format = parse_format(&format_str);
    let (ctx, _) = open_context(config_path, None)?;
    let results = ctx.history(&resource_id, limit).await?;
    print!("{}", output::render_history(&resource_id, &results, format)?);
    Ok(0)
}

async fn cmd_report(
    config_path: &Path,
    resource_id: Option<String>,
    hours: i64,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    format_str: String,
) -> Result<i32, ShieldError> {
    if hours <= 0 {
        return Err(ShieldError::Config("--hours must be positive".into()));
    }
    let range = TimeRange::window(since, until, chrono::Duration::hours(hours))?;
    let format = parse_format(&format_str);
    let (ctx, _) = open_context(config_path, None)?;
    let rollup = ctx.report(resource_id.as_deref(), &range).await?;
    print!("{}", output::render_rollup(&rollup, format)?);
    Ok(0)
}

fn cmd_list_rules(config_path: &Path, format_str: String) -> Result<i32, ShieldError> {
    let config = Config::load(config_path)?;
    let registry = PolicyRegistry::from_policy(&config.policy)?;
    let rules = registry.list_rules();

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&rules)?;
            println!("{}", json);
        }
        _ => {
            println!(
                "{:<10} {:<28} {:<10} {:<14} APPLIES TO",
                "ID", "NAME", "SEVERITY", "CATEGORY"
            );
            println!("{}", "-".repeat(90));
            for rule in &rules {
                let applies_to: Vec<String> =
                    rule.applies_to.iter().map(|t| t.to_string()).collect();
                println!(
                    "{:<10} {:<28} {:<10} {:<14} {}",
                    rule.id,
                    rule.name,
                    rule.severity.to_string(),
                    rule.category.to_string(),
                    applies_to.join(", "),
                );
            }
        }
    }

    Ok(0)
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32, ShieldError> {
    if config_path.exists() && !force {
        eprintln!(
            "{} already exists. Use --force to overwrite.",
            config_path.display()
        );
        return Ok(1);
    }

    std::fs::write(config_path, Config::starter_toml())?;
    println!("Created {}", config_path.display());

    Ok(0)
}
