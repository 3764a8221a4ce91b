//! Coverage data merging
//!
//! Coverage artifacts use the per-file subset of coverage.py's JSON report:
//!
//! ```json
//! { "files": { "flocker/node/agents.py": { "executed_lines": [1, 2], "missing_lines": [3] } } }
//! ```
//!
//! Merging unions executed lines per file. A line executed by any instance
//! is no longer missing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Line coverage of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCoverage {
    /// Lines that ran
    #[serde(default)]
    pub executed_lines: BTreeSet<u32>,
    /// Measurable lines that did not run
    #[serde(default)]
    pub missing_lines: BTreeSet<u32>,
}

impl FileCoverage {
    /// Number of measurable lines
    #[must_use]
    pub fn total(&self) -> usize {
        self.executed_lines.len() + self.missing_lines.len()
    }

    /// Percentage of measurable lines that ran; 100 for an empty file
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        percent(self.executed_lines.len(), self.total())
    }

    fn merge(&mut self, other: &FileCoverage) {
        self.executed_lines.extend(other.executed_lines.iter().copied());
        self.missing_lines.extend(other.missing_lines.iter().copied());
        let executed = &self.executed_lines;
        self.missing_lines.retain(|line| !executed.contains(line));
    }
}

/// Coverage merged across any number of instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Per-file coverage, sorted by path
    pub files: BTreeMap<String, FileCoverage>,
}

impl CoverageReport {
    /// Creates an empty report
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one coverage artifact
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the document does not match the format.
    pub fn parse(input: &str) -> Result<Self, serde_json::Error> {
        let mut report: Self = serde_json::from_str(input)?;
        // Normalise files that list a line as both executed and missing
        for file in report.files.values_mut() {
            let executed = &file.executed_lines;
            file.missing_lines.retain(|line| !executed.contains(line));
        }
        Ok(report)
    }

    /// Merges another report into this one
    pub fn merge(&mut self, other: &CoverageReport) {
        for (path, coverage) in &other.files {
            self.files.entry(path.clone()).or_default().merge(coverage);
        }
    }

    /// Lines executed across all files
    #[must_use]
    pub fn covered_lines(&self) -> usize {
        self.files.values().map(|f| f.executed_lines.len()).sum()
    }

    /// Measurable lines across all files
    #[must_use]
    pub fn total_lines(&self) -> usize {
        self.files.values().map(FileCoverage::total).sum()
    }

    /// Total line coverage percentage
    #[must_use]
    pub fn percent(&self) -> f64 {
        percent(self.covered_lines(), self.total_lines())
    }

    /// Serializes the merged report in the input format
    ///
    /// # Errors
    ///
    /// Returns the JSON error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(covered: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        covered as f64 * 100.0 / total as f64
    }
}
