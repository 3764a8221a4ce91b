//! `jobline expand` - List the instances a configuration expands to

use anyhow::{Context, Result};
use jobline::{JobGraph, JobInstance, ParameterExpander};
use std::fmt::Write as _;
use std::path::Path;

use super::OutputFormat;

/// Expand a job configuration into instances and render them
///
/// # Errors
///
/// Returns an error if the configuration is invalid or names an unknown job.
pub fn expand_config(file: &Path, jobs: &[String], format: OutputFormat) -> Result<String> {
    let graph = JobGraph::load(file)
        .with_context(|| format!("Invalid job configuration: {}", file.display()))?
        .filter(jobs)?;
    let instances = ParameterExpander::for_graph(&graph).expand_all(&graph);
    render(&instances, format)
}

/// Render instances as text or JSON
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(instances: &[JobInstance], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(instances).context("Failed to serialize instances")
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for instance in instances {
                let _ = writeln!(
                    out,
                    "{}  [{}]  {} command(s)",
                    instance.id,
                    instance.labels.join(","),
                    instance.commands.len()
                );
            }
            let _ = write!(out, "{} instance(s)", instances.len());
            Ok(out)
        }
    }
}
