//! `jobline check` - Load and validate a job configuration
//!
//! Every fragment and job is resolved, so unknown or cyclic fragment
//! references and malformed jobs are reported without running anything.
//!
//! ## Usage
//!
//! ```bash
//! jobline check jobs.yaml
//! # Exit code 0: configuration is valid
//! # Exit code 1: configuration error
//! ```

use anyhow::{Context, Result};
use jobline::JobGraph;
use std::fmt::Write as _;
use std::path::Path;

/// Validate a job configuration and describe what it contains
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation.
pub fn check_config(file: &Path) -> Result<String> {
    tracing::debug!(file = %file.display(), "Validating job configuration");

    let graph = JobGraph::load(file)
        .with_context(|| format!("Invalid job configuration: {}", file.display()))?;

    Ok(describe(&graph))
}

fn describe(graph: &JobGraph) -> String {
    let mut out = String::new();
    for definition in graph.definitions() {
        let _ = writeln!(
            out,
            "{:<40} {:>3} instance(s)  labels: {}",
            definition.name,
            definition.instance_count(),
            definition.labels.join(",")
        );
    }
    let _ = writeln!(
        out,
        "OK: {} fragment(s), {} job(s), {} instance(s)",
        graph.registry().len(),
        graph.definitions().len(),
        graph.instance_count()
    );
    out
}
