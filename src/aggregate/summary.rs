//! Result aggregation.
//!
//! The [`Aggregator`] runs once every instance reached a terminal state. It
//! collects declared artifacts from instance workspaces, merges coverage,
//! counts test results, and produces a single [`Summary`].
//!
//! Missing or unreadable artifacts become [`ArtifactWarning`]s. They never
//! abort aggregation, since a failed instance may legitimately produce none.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::coverage::CoverageReport;
use super::junit::{TestCase, TestCounts, TestOutcome, TestSuite, render_junit};
use crate::job::{Artifact, ArtifactKind, InstanceStatus};
use crate::worker::InstanceResult;

/// Problem found while collecting an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ArtifactWarning {
    /// No file matched the artifact pattern
    Missing {
        /// Instance id
        instance: String,
        /// Artifact pattern
        pattern: String,
    },
    /// The pattern is not a valid glob
    InvalidPattern {
        /// Instance id
        instance: String,
        /// Artifact pattern
        pattern: String,
        /// Parser message
        reason: String,
    },
    /// A matched file could not be read, parsed or copied
    Unreadable {
        /// Instance id
        instance: String,
        /// File path
        path: PathBuf,
        /// Error message
        reason: String,
    },
}

impl fmt::Display for ArtifactWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { instance, pattern } => {
                write!(f, "{instance}: no file matches artifact '{pattern}'")
            }
            Self::InvalidPattern {
                instance,
                pattern,
                reason,
            } => write!(f, "{instance}: invalid artifact pattern '{pattern}': {reason}"),
            Self::Unreadable {
                instance,
                path,
                reason,
            } => write!(f, "{instance}: cannot use {}: {reason}", path.display()),
        }
    }
}

/// Artifact file found in an instance workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedArtifact {
    /// Instance that produced it
    pub instance_id: String,
    /// Artifact name
    pub name: String,
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Path inside the workspace
    pub source: PathBuf,
    /// Copy under the artifact directory, if one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<PathBuf>,
}

/// Per-instance line of the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    /// Instance id
    pub instance_id: String,
    /// Job name
    pub job_name: String,
    /// Worker that ran it
    pub worker: Option<String>,
    /// Terminal status
    pub status: InstanceStatus,
    /// Wall time
    pub duration: Duration,
    /// Test counts from this instance's logs
    pub tests: TestCounts,
}

/// Aggregate outcome of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Batch id
    pub batch_id: Uuid,
    /// Time aggregation finished
    pub finished_at: DateTime<Utc>,
    /// Per-instance outcomes in dispatch order
    pub instances: Vec<InstanceSummary>,
    /// Test counts across all instances
    pub tests: TestCounts,
    /// Merged coverage, if any instance produced coverage data
    pub coverage: Option<CoverageReport>,
    /// Collected artifact files
    pub artifacts: Vec<CollectedArtifact>,
    /// Collection problems
    pub warnings: Vec<ArtifactWarning>,
    /// Parsed test cases grouped by instance
    #[serde(skip)]
    pub suites: Vec<TestSuite>,
}

impl Summary {
    /// Number of instances
    #[must_use]
    pub fn total(&self) -> usize {
        self.instances.len()
    }

    /// Instances that succeeded
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(InstanceStatus::is_success)
    }

    /// Instances that failed for any reason
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(InstanceStatus::is_failure)
    }

    /// Instances that exceeded their timeout
    #[must_use]
    pub fn timed_out(&self) -> usize {
        self.count(InstanceStatus::is_timeout)
    }

    /// Instances no worker could run
    #[must_use]
    pub fn unscheduled(&self) -> usize {
        self.count(InstanceStatus::is_unscheduled)
    }

    /// Returns true only if every instance succeeded and no test failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.tests.failed == 0
    }

    /// Renders the batch as JUnit XML.
    ///
    /// Each instance contributes a synthetic test case for its own status,
    /// followed by a suite of the tests parsed from its logs.
    #[must_use]
    pub fn to_junit_xml(&self) -> String {
        let mut instances = TestSuite::new("instances");
        for instance in &self.instances {
            let case = TestCase::new(
                &instance.instance_id,
                &instance.job_name,
                if instance.status.is_success() {
                    TestOutcome::Passed
                } else {
                    TestOutcome::Failed
                },
            );
            instances.cases.push(if instance.status.is_success() {
                case
            } else {
                case.with_message(describe(&instance.status))
            });
        }

        let mut suites = vec![instances];
        suites.extend(self.suites.iter().cloned());
        render_junit(
            &format!("jobline-{}", self.batch_id),
            &self.finished_at.to_rfc3339(),
            &suites,
        )
    }

    fn count(&self, predicate: fn(&InstanceStatus) -> bool) -> usize {
        self.instances.iter().filter(|i| predicate(&i.status)).count()
    }
}

fn describe(status: &InstanceStatus) -> String {
    match status {
        InstanceStatus::Failed {
            exit_code,
            command_index,
        } => format!("command {command_index} exited with {exit_code}"),
        InstanceStatus::TimedOut { after } => format!("timed out after {after:?}"),
        InstanceStatus::NoEligibleWorker { labels } => {
            format!("no worker advertises [{}]", labels.join(", "))
        }
        InstanceStatus::Errored { reason } => reason.clone(),
        InstanceStatus::Succeeded => status.to_string(),
    }
}

/// Collects instance results into a [`Summary`]
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    artifact_dir: Option<PathBuf>,
}

impl Aggregator {
    /// Creates an aggregator that leaves artifacts in place
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies collected artifacts under `dir`, one subdirectory per instance
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Aggregates a finished batch
    #[must_use]
    pub fn collect(&self, results: &[InstanceResult]) -> Summary {
        let mut summary = Summary {
            batch_id: Uuid::new_v4(),
            finished_at: Utc::now(),
            instances: Vec::with_capacity(results.len()),
            tests: TestCounts::default(),
            coverage: None,
            artifacts: Vec::new(),
            warnings: Vec::new(),
            suites: Vec::new(),
        };

        for result in results {
            let mut suite = TestSuite::new(&result.instance_id);

            // Instances that never ran have no workspace to collect from
            if let Some(workspace) = &result.workspace {
                for artifact in &result.artifacts {
                    self.collect_artifact(result, workspace, artifact, &mut suite, &mut summary);
                }
            }

            let tests = suite.counts();
            summary.tests.add(tests);
            if !suite.cases.is_empty() {
                summary.suites.push(suite);
            }
            summary.instances.push(InstanceSummary {
                instance_id: result.instance_id.clone(),
                job_name: result.job_name.clone(),
                worker: result.worker.clone(),
                status: result.status.clone(),
                duration: result.duration,
                tests,
            });
        }

        for warning in &summary.warnings {
            warn!("{warning}");
        }
        info!(
            batch = %summary.batch_id,
            total = summary.total(),
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            tests_failed = summary.tests.failed,
            warnings = summary.warnings.len(),
            "Aggregated batch"
        );
        summary
    }

    fn collect_artifact(
        &self,
        result: &InstanceResult,
        workspace: &Path,
        artifact: &Artifact,
        suite: &mut TestSuite,
        summary: &mut Summary,
    ) {
        // Only the artifact pattern is a glob; the workspace prefix is literal
        let prefix = glob::Pattern::escape(&workspace.to_string_lossy());
        let pattern = format!("{}/{}", prefix.trim_end_matches('/'), artifact.pattern);
        let paths = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                summary.warnings.push(ArtifactWarning::InvalidPattern {
                    instance: result.instance_id.clone(),
                    pattern: artifact.pattern.clone(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        let mut matched = 0usize;
        for entry in paths {
            let path = match entry {
                Ok(path) if path.is_file() => path,
                Ok(_) => continue,
                Err(e) => {
                    summary.warnings.push(ArtifactWarning::Unreadable {
                        instance: result.instance_id.clone(),
                        path: e.path().to_path_buf(),
                        reason: e.error().to_string(),
                    });
                    continue;
                }
            };
            matched += 1;
            debug!(instance = %result.instance_id, path = %path.display(), kind = %artifact.kind, "Found artifact");

            match artifact.kind {
                ArtifactKind::Coverage => match read_coverage(&path) {
                    Ok(report) => summary
                        .coverage
                        .get_or_insert_with(CoverageReport::new)
                        .merge(&report),
                    Err(reason) => summary.warnings.push(ArtifactWarning::Unreadable {
                        instance: result.instance_id.clone(),
                        path: path.clone(),
                        reason,
                    }),
                },
                ArtifactKind::TestLog => match std::fs::read_to_string(&path) {
                    Ok(content) => suite.cases.extend(super::junit::parse_test_log(&content)),
                    Err(e) => summary.warnings.push(ArtifactWarning::Unreadable {
                        instance: result.instance_id.clone(),
                        path: path.clone(),
                        reason: e.to_string(),
                    }),
                },
                ArtifactKind::Archive => {}
            }

            let stored = match self.store(result, workspace, &path) {
                Ok(stored) => stored,
                Err(e) => {
                    summary.warnings.push(ArtifactWarning::Unreadable {
                        instance: result.instance_id.clone(),
                        path: path.clone(),
                        reason: format!("copy failed: {e}"),
                    });
                    None
                }
            };

            summary.artifacts.push(CollectedArtifact {
                instance_id: result.instance_id.clone(),
                name: artifact.name.clone(),
                kind: artifact.kind,
                source: path,
                stored,
            });
        }

        if matched == 0 {
            summary.warnings.push(ArtifactWarning::Missing {
                instance: result.instance_id.clone(),
                pattern: artifact.pattern.clone(),
            });
        }
    }

    fn store(
        &self,
        result: &InstanceResult,
        workspace: &Path,
        path: &Path,
    ) -> std::io::Result<Option<PathBuf>> {
        let Some(root) = &self.artifact_dir else {
            return Ok(None);
        };

        let relative = path.strip_prefix(workspace).unwrap_or(path);
        let target = root.join(instance_dir(result)).join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(path, &target)?;
        Ok(Some(target))
    }
}

fn instance_dir(result: &InstanceResult) -> PathBuf {
    PathBuf::from(crate::job::instance::relative_workspace(
        &result.job_name,
        result.binding.as_ref(),
    ))
}

fn read_coverage(path: &Path) -> Result<CoverageReport, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    CoverageReport::parse(&content).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ParameterBinding;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn result(id: &str, status: InstanceStatus, workspace: Option<&Path>) -> InstanceResult {
        let (job, binding) = match id.split_once('/') {
            Some((job, value)) => (
                job.to_string(),
                Some(ParameterBinding {
                    name: "MODULE".into(),
                    value: value.into(),
                }),
            ),
            None => (id.to_string(), None),
        };
        InstanceResult {
            instance_id: id.into(),
            job_name: job,
            binding,
            worker: Some("w".into()),
            status,
            commands: Vec::new(),
            workspace: workspace.map(Path::to_path_buf),
            artifacts: Vec::new(),
            duration: Duration::from_millis(5),
        }
    }

    fn failed() -> InstanceStatus {
        InstanceStatus::Failed {
            exit_code: 1,
            command_index: 0,
        }
    }

    #[test]
    fn test_mixed_batch_is_not_success() {
        let results = vec![
            result("a", InstanceStatus::Succeeded, None),
            result("b", failed(), None),
        ];
        let summary = Aggregator::new().collect(&results);
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_all_succeeded_is_success() {
        let results = vec![
            result("a", InstanceStatus::Succeeded, None),
            result("b", InstanceStatus::Succeeded, None),
        ];
        assert!(Aggregator::new().collect(&results).is_success());
    }

    #[test]
    fn test_unscheduled_counts_as_failure() {
        let results = vec![result(
            "a",
            InstanceStatus::NoEligibleWorker {
                labels: vec!["centos-7".into()],
            },
            None,
        )];
        let summary = Aggregator::new().collect(&results);
        assert_eq!(summary.unscheduled(), 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_missing_artifact_is_warning() {
        let ws = TempDir::new().unwrap();
        let mut r = result("a", failed(), Some(ws.path()));
        r.artifacts.push(Artifact::archive("_trial_temp/*.log"));

        let summary = Aggregator::new().collect(&[r]);
        assert_eq!(
            summary.warnings,
            vec![ArtifactWarning::Missing {
                instance: "a".into(),
                pattern: "_trial_temp/*.log".into(),
            }]
        );
        assert_eq!(summary.failed(), 1);
    }

    #[test]
    fn test_coverage_merged_across_instances() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        std::fs::write(
            first.path().join("coverage.json"),
            r#"{"files": {"a.py": {"executed_lines": [1], "missing_lines": [2]}}}"#,
        )
        .unwrap();
        std::fs::write(
            second.path().join("coverage.json"),
            r#"{"files": {"a.py": {"executed_lines": [2], "missing_lines": [1]}}}"#,
        )
        .unwrap();

        let results: Vec<_> = [("j/m1", first.path()), ("j/m2", second.path())]
            .into_iter()
            .map(|(id, ws)| {
                let mut r = result(id, InstanceStatus::Succeeded, Some(ws));
                r.artifacts.push(Artifact::coverage("coverage.json"));
                r
            })
            .collect();

        let summary = Aggregator::new().collect(&results);
        let coverage = summary.coverage.unwrap();
        assert_eq!(coverage.covered_lines(), 2);
        assert!((coverage.percent() - 100.0).abs() < f64::EPSILON);
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn test_unparseable_coverage_is_warning() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("coverage.json"), "garbage").unwrap();
        let mut r = result("a", InstanceStatus::Succeeded, Some(ws.path()));
        r.artifacts.push(Artifact::coverage("coverage.json"));

        let summary = Aggregator::new().collect(&[r]);
        assert!(summary.coverage.is_none());
        assert!(matches!(
            summary.warnings[0],
            ArtifactWarning::Unreadable { .. }
        ));
    }

    #[test]
    fn test_failed_tests_fail_the_batch() {
        let ws = TempDir::new().unwrap();
        std::fs::write(
            ws.path().join("test.log"),
            "pkg\n  Cls\n    test_a ... [OK]\n    test_b ... [FAIL]\n",
        )
        .unwrap();
        let mut r = result("a", InstanceStatus::Succeeded, Some(ws.path()));
        r.artifacts.push(Artifact::test_log("test.log"));

        let summary = Aggregator::new().collect(&[r]);
        assert_eq!(summary.tests.passed, 1);
        assert_eq!(summary.tests.failed, 1);
        assert_eq!(summary.instances[0].tests.failed, 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_workspace_with_glob_characters() {
        let root = TempDir::new().unwrap();
        let ws = root.path().join("ws[1]*");
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::write(ws.join("test.log"), "pkg\n  Cls\n    test_a ... [OK]\n").unwrap();
        std::fs::create_dir_all(root.path().join("ws1")).unwrap();
        std::fs::write(root.path().join("ws1/test.log"), "pkg\n  Cls\n    test_b ... [FAIL]\n")
            .unwrap();

        let mut r = result("a", InstanceStatus::Succeeded, Some(&ws));
        r.artifacts.push(Artifact::test_log("*.log"));

        let summary = Aggregator::new().collect(&[r]);
        assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
        assert_eq!(summary.tests.passed, 1);
        assert_eq!(summary.tests.failed, 0);
    }

    #[test]
    fn test_artifacts_copied_per_instance() {
        let ws = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("logs")).unwrap();
        std::fs::write(ws.path().join("logs/one.log"), "1").unwrap();
        std::fs::write(ws.path().join("logs/two.log"), "2").unwrap();

        let mut r = result("job/flocker.node", InstanceStatus::Succeeded, Some(ws.path()));
        r.artifacts.push(Artifact::archive("logs/*.log"));

        let summary = Aggregator::new()
            .with_artifact_dir(out.path())
            .collect(&[r]);

        assert_eq!(summary.artifacts.len(), 2);
        let copied = out.path().join("job/flocker.node/logs/one.log");
        assert_eq!(std::fs::read_to_string(copied).unwrap(), "1");
        assert_eq!(
            summary.artifacts[0].stored.as_deref(),
            Some(out.path().join("job/flocker.node/logs/one.log").as_path())
        );
    }

    #[test]
    fn test_junit_has_case_per_instance() {
        let results = vec![
            result("a", InstanceStatus::Succeeded, None),
            result(
                "b",
                InstanceStatus::TimedOut {
                    after: Duration::from_secs(3),
                },
                None,
            ),
        ];
        let xml = Aggregator::new().collect(&results).to_junit_xml();
        assert!(xml.contains("<testcase name=\"a\" classname=\"a\"/>"));
        assert!(xml.contains("timed out after 3s"));
        assert!(xml.contains("tests=\"2\" failures=\"1\""));
    }
}
