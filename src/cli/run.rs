//! `jobline run` - Run every instance and aggregate the results
//!
//! ## Usage
//!
//! ```bash
//! jobline run jobs.yaml --workers workers.yaml --junit results.xml
//! # Exit code 0: every instance succeeded and no test failed
//! # Exit code 1: otherwise
//! ```
//!
//! Without `--workers`, a single local worker runs everything. It advertises
//! the `--label` values, or every label the selected jobs require when none
//! are given.

use anyhow::{Context, Result, bail};
use clap::Args;
use jobline::aggregate::{Aggregator, Summary};
use jobline::executor::{HealthStatus, InstanceExecutor, LocalExecutor, WorkspaceManager};
use jobline::infrastructure::{Config, JobMetrics, MetricsCollector};
use jobline::job::{JobGraphBuilder, JobInstance, ParameterExpander, RawConfig};
use jobline::worker::{DispatchPlan, Dispatcher, Worker, WorkerInventory, WorkerPool};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::OutputFormat;

/// Name of the implicit worker used without an inventory
pub const LOCAL_WORKER: &str = "local";

/// Arguments of `jobline run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Job configuration file
    pub file: PathBuf,

    /// Worker inventory file
    #[arg(short, long)]
    pub workers: Option<PathBuf>,

    /// Label advertised by the local worker (repeatable)
    #[arg(short, long = "label")]
    pub labels: Vec<String>,

    /// Only run these jobs (repeatable)
    #[arg(short, long = "job")]
    pub jobs: Vec<String>,

    /// Global variable KEY=VALUE (repeatable)
    #[arg(short, long, value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Per-instance timeout in seconds for jobs without their own
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Directory holding one workspace per instance
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Directory to copy collected artifacts into
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Write a JUnit XML report to this file
    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// Print where each instance would run without running it
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

fn parse_key_val(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{input}'")),
    }
}

/// Run a batch end to end; returns whether the summary is a success
///
/// # Errors
///
/// Returns an error for configuration problems. Instance failures are
/// reported through the summary instead.
pub async fn run_batch(args: RunArgs, config: &Config) -> Result<bool> {
    let builder = args
        .env
        .iter()
        .fold(JobGraphBuilder::new(), |builder, (k, v)| builder.with_env(k, v));
    let raw = RawConfig::load(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let graph = builder
        .build(&raw)
        .with_context(|| format!("Invalid job configuration: {}", args.file.display()))?
        .filter(&args.jobs)?;
    let instances = ParameterExpander::for_graph(&graph).expand_all(&graph);

    let executor: Arc<dyn InstanceExecutor> =
        Arc::new(LocalExecutor::new().with_shell_config(config.shell_config()?));
    match executor.health_check().await {
        HealthStatus::Healthy => {}
        HealthStatus::Degraded { reason } => warn!(%reason, "Executor is degraded"),
        health @ HealthStatus::Unhealthy { .. } => {
            bail!("Executor is not operational: {health:?}")
        }
    }

    let pool = build_pool(&args, &instances, &executor)?;
    let workspace_root = args
        .workspace_root
        .clone()
        .unwrap_or_else(|| config.workspace_root.clone());
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .or_else(|| config.instance_timeout());
    let dispatcher = Dispatcher::new(pool, WorkspaceManager::new(workspace_root)).with_timeout(timeout);

    if args.dry_run {
        let plans = dispatcher.dry_run(&instances);
        println!("{}", render_plans(&plans, args.format)?);
        return Ok(true);
    }

    let results = dispatcher.schedule(instances).await;

    let metrics = MetricsCollector::new();
    metrics.record_all(&results);

    let artifact_dir = args.artifact_dir.clone().or_else(|| config.artifact_dir.clone());
    let mut aggregator = Aggregator::new();
    if let Some(dir) = &artifact_dir {
        aggregator = aggregator.with_artifact_dir(dir);
    }
    let summary = aggregator.collect(&results);

    if let Some(path) = &args.junit {
        std::fs::write(path, summary.to_junit_xml())
            .with_context(|| format!("Failed to write JUnit report: {}", path.display()))?;
        info!(path = %path.display(), "Wrote JUnit report");
    }
    if let (Some(dir), Some(coverage)) = (&artifact_dir, &summary.coverage) {
        write_coverage(dir, &coverage.to_json()?)?;
    }

    println!("{}", render_summary(&summary, &metrics.get_all(), args.format)?);
    Ok(summary.is_success())
}

fn build_pool(
    args: &RunArgs,
    instances: &[JobInstance],
    executor: &Arc<dyn InstanceExecutor>,
) -> Result<WorkerPool> {
    if let Some(path) = &args.workers {
        let inventory = WorkerInventory::load(path)
            .with_context(|| format!("Invalid worker inventory: {}", path.display()))?;
        if inventory.workers.is_empty() {
            warn!(path = %path.display(), "Worker inventory is empty");
        }
        return Ok(WorkerPool::from_inventory(&inventory, executor));
    }

    let labels: BTreeSet<String> = if args.labels.is_empty() {
        instances.iter().flat_map(|i| i.labels.iter().cloned()).collect()
    } else {
        args.labels.iter().cloned().collect()
    };
    info!(labels = ?labels, "Using a single local worker");
    Ok(WorkerPool::new().with_worker(Worker::new(LOCAL_WORKER, labels, Arc::clone(executor))))
}

fn write_coverage(dir: &Path, json: &str) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("coverage.json");
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write merged coverage: {}", path.display()))?;
    info!(path = %path.display(), "Wrote merged coverage");
    Ok(())
}

/// Render dry-run placements
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_plans(plans: &[DispatchPlan], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(plans).context("Failed to serialize plan");
    }

    let mut out = String::new();
    for plan in plans {
        let workers = if plan.eligible_workers.is_empty() {
            "NO ELIGIBLE WORKER".to_string()
        } else {
            plan.eligible_workers.join(",")
        };
        let _ = writeln!(out, "{}  -> {}  ({})", plan.instance_id, workers, plan.workspace.display());
        for command in &plan.commands {
            let _ = writeln!(out, "    $ {command}");
        }
    }
    let _ = write!(out, "{} instance(s) planned", plans.len());
    Ok(out)
}

/// Render the batch summary and per-job metrics
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_summary(summary: &Summary, metrics: &[JobMetrics], format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        let doc = serde_json::json!({
            "success": summary.is_success(),
            "summary": summary,
            "metrics": metrics,
        });
        return serde_json::to_string_pretty(&doc).context("Failed to serialize summary");
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:<12} {:<12} {:>9}  TESTS (pass/fail/skip)",
        "INSTANCE", "WORKER", "STATUS", "DURATION"
    );
    for instance in &summary.instances {
        let _ = writeln!(
            out,
            "{:<40} {:<12} {:<12} {:>8.1}s  {}/{}/{}",
            instance.instance_id,
            instance.worker.as_deref().unwrap_or("-"),
            instance.status.to_string(),
            instance.duration.as_secs_f64(),
            instance.tests.passed,
            instance.tests.failed,
            instance.tests.skipped,
        );
    }

    for warning in &summary.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }

    if !metrics.is_empty() {
        let _ = writeln!(out);
        for job in metrics {
            let _ = writeln!(
                out,
                "job {:<36} {}/{} succeeded, mean {:.1}s",
                job.job_name,
                job.succeeded,
                job.instances,
                job.mean_duration().as_secs_f64()
            );
        }
    }

    let _ = writeln!(out);
    if let Some(coverage) = &summary.coverage {
        let _ = writeln!(
            out,
            "coverage: {:.1}% ({}/{} lines)",
            coverage.percent(),
            coverage.covered_lines(),
            coverage.total_lines()
        );
    }
    let _ = writeln!(
        out,
        "tests: {} passed, {} failed, {} skipped",
        summary.tests.passed, summary.tests.failed, summary.tests.skipped
    );
    let _ = write!(
        out,
        "{}: {}/{} instance(s) succeeded ({} timed out, {} unscheduled)",
        if summary.is_success() { "SUCCESS" } else { "FAILURE" },
        summary.succeeded(),
        summary.total(),
        summary.timed_out(),
        summary.unscheduled()
    );
    Ok(out)
}
