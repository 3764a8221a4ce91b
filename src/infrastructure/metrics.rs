//! Metrics collection
//!
//! Per-job execution metrics, recorded from instance results.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::worker::InstanceResult;

/// Metrics for one job across its instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetrics {
    /// Job name
    pub job_name: String,

    /// Number of instances
    pub instances: usize,

    /// Instances that succeeded
    pub succeeded: usize,

    /// Instances that failed, timed out or were not scheduled
    pub failed: usize,

    /// Summed instance wall time
    pub total_duration: Duration,
}

impl JobMetrics {
    /// Mean wall time per instance
    #[must_use]
    pub fn mean_duration(&self) -> Duration {
        u32::try_from(self.instances)
            .ok()
            .filter(|n| *n > 0)
            .map_or(Duration::ZERO, |n| self.total_duration / n)
    }
}

/// Metrics collector for job executions
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    /// Collected metrics keyed by job name
    metrics: Arc<RwLock<BTreeMap<String, JobMetrics>>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one finished instance
    pub fn record(&self, result: &InstanceResult) {
        let mut metrics = self.metrics.write();
        let entry = metrics
            .entry(result.job_name.clone())
            .or_insert_with(|| JobMetrics {
                job_name: result.job_name.clone(),
                ..JobMetrics::default()
            });
        entry.instances += 1;
        if result.status.is_success() {
            entry.succeeded += 1;
        } else {
            entry.failed += 1;
        }
        entry.total_duration += result.duration;
    }

    /// Records every result of a batch
    pub fn record_all(&self, results: &[InstanceResult]) {
        for result in results {
            self.record(result);
        }
    }

    /// Gets metrics for a specific job
    #[must_use]
    pub fn get(&self, job_name: &str) -> Option<JobMetrics> {
        self.metrics.read().get(job_name).cloned()
    }

    /// Gets all recorded metrics, sorted by job name
    #[must_use]
    pub fn get_all(&self) -> Vec<JobMetrics> {
        self.metrics.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::InstanceStatus;

    fn result(job: &str, status: InstanceStatus, millis: u64) -> InstanceResult {
        InstanceResult {
            instance_id: job.to_string(),
            job_name: job.to_string(),
            binding: None,
            worker: None,
            status,
            commands: Vec::new(),
            workspace: None,
            artifacts: Vec::new(),
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new();

        assert!(collector.get("test").is_none());
        assert!(collector.get_all().is_empty());
    }

    #[test]
    fn test_metrics_collector_record() {
        let collector = MetricsCollector::new();

        collector.record_all(&[
            result("trial", InstanceStatus::Succeeded, 100),
            result(
                "trial",
                InstanceStatus::TimedOut {
                    after: Duration::from_secs(1),
                },
                300,
            ),
            result("docs", InstanceStatus::Succeeded, 50),
        ]);

        let trial = collector.get("trial").unwrap();
        assert_eq!(trial.instances, 2);
        assert_eq!(trial.succeeded, 1);
        assert_eq!(trial.failed, 1);
        assert_eq!(trial.mean_duration(), Duration::from_millis(200));

        let names: Vec<_> = collector.get_all().into_iter().map(|m| m.job_name).collect();
        assert_eq!(names, vec!["docs", "trial"]);
    }

    #[test]
    fn test_mean_duration_of_empty_metrics() {
        assert_eq!(JobMetrics::default().mean_duration(), Duration::ZERO);
    }
}
