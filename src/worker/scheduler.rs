//! Instance scheduling and dispatch.
//!
//! Every instance is dispatched on its own task. An instance waits for the
//! first free worker whose labels cover its requirements, runs its
//! pipeline there, and releases the worker. Instances with no eligible
//! worker fail immediately without affecting the rest of the batch.
//! [`Dispatcher::schedule`] returns only once every instance reached a
//! terminal state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, select_all};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, info, warn};

use super::pool::{Worker, WorkerPool};
use crate::executor::{PipelineRequest, ShellResult, WorkspaceManager};
use crate::job::{Artifact, InstanceStatus, JobInstance, ParameterBinding, SchedulingError};

/// Result of one instance, consumed by the aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceResult {
    /// Instance id
    pub instance_id: String,
    /// Job the instance belongs to
    pub job_name: String,
    /// Parameter binding, if any
    pub binding: Option<ParameterBinding>,
    /// Worker that ran the pipeline
    pub worker: Option<String>,
    /// Terminal status
    pub status: InstanceStatus,
    /// Commands that ran
    pub commands: Vec<ShellResult>,
    /// Workspace the pipeline ran in
    pub workspace: Option<PathBuf>,
    /// Artifacts declared by the job
    pub artifacts: Vec<Artifact>,
    /// Wall time from dispatch to completion
    pub duration: Duration,
}

impl InstanceResult {
    fn not_run(instance: &JobInstance, status: InstanceStatus) -> Self {
        Self {
            instance_id: instance.id.clone(),
            job_name: instance.job_name.clone(),
            binding: instance.binding.clone(),
            worker: None,
            status,
            commands: Vec::new(),
            workspace: None,
            artifacts: instance.artifacts.clone(),
            duration: Duration::ZERO,
        }
    }
}

/// Planned placement of an instance, produced without running anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPlan {
    /// Instance id
    pub instance_id: String,
    /// Workers able to run it, in preference order
    pub eligible_workers: Vec<String>,
    /// Commands with variables still unexpanded
    pub commands: Vec<String>,
    /// Workspace it would run in
    pub workspace: PathBuf,
    /// Effective timeout
    pub timeout: Option<Duration>,
}

/// Dispatches instances onto a worker pool
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pool: Arc<WorkerPool>,
    workspaces: WorkspaceManager,
    default_timeout: Option<Duration>,
}

impl Dispatcher {
    /// Creates a dispatcher
    #[must_use]
    pub fn new(pool: WorkerPool, workspaces: WorkspaceManager) -> Self {
        Self {
            pool: Arc::new(pool),
            workspaces,
            default_timeout: None,
        }
    }

    /// Sets the global per-instance timeout; a job's own timeout wins
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Worker pool in use
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs every instance and returns results in input order.
    ///
    /// Scheduling and execution failures are recorded per instance; the
    /// batch always runs to completion.
    pub async fn schedule(&self, instances: Vec<JobInstance>) -> Vec<InstanceResult> {
        info!(
            instances = instances.len(),
            workers = self.pool.len(),
            "Scheduling batch"
        );

        let handles: Vec<_> = instances
            .into_iter()
            .map(|instance| {
                let dispatcher = self.clone();
                let fallback = instance.clone();
                let handle = tokio::spawn(async move { dispatcher.dispatch(instance).await });
                (fallback, handle)
            })
            .collect();

        let (fallbacks, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;

        let results: Vec<InstanceResult> = joined
            .into_iter()
            .zip(fallbacks)
            .map(|(joined, instance)| {
                joined.unwrap_or_else(|e| {
                    error!(instance = %instance.id, error = %e, "Dispatch task aborted");
                    InstanceResult::not_run(
                        &instance,
                        InstanceStatus::Errored {
                            reason: format!("dispatch task aborted: {e}"),
                        },
                    )
                })
            })
            .collect();

        let failed = results.iter().filter(|r| r.status.is_failure()).count();
        info!(
            instances = results.len(),
            failed, "Batch reached terminal state"
        );
        results
    }

    /// Describes where each instance could run, without running it
    #[must_use]
    pub fn dry_run(&self, instances: &[JobInstance]) -> Vec<DispatchPlan> {
        instances
            .iter()
            .map(|instance| DispatchPlan {
                instance_id: instance.id.clone(),
                eligible_workers: self
                    .pool
                    .eligible(&instance.labels)
                    .iter()
                    .map(|w| w.name().to_string())
                    .collect(),
                commands: instance.commands.clone(),
                workspace: self.workspaces.path_for(instance),
                timeout: instance.timeout.or(self.default_timeout),
            })
            .collect()
    }

    async fn dispatch(&self, instance: JobInstance) -> InstanceResult {
        let eligible = self.pool.eligible(&instance.labels);
        if eligible.is_empty() {
            let err = SchedulingError::NoEligibleWorker {
                instance: instance.id.clone(),
                labels: instance.labels.clone(),
            };
            warn!(instance = %instance.id, "{err}");
            return InstanceResult::not_run(
                &instance,
                InstanceStatus::NoEligibleWorker {
                    labels: instance.labels.clone(),
                },
            );
        }

        let start = Instant::now();
        let Some((worker, permit)) = claim_any(&eligible).await else {
            return InstanceResult::not_run(
                &instance,
                InstanceStatus::Errored {
                    reason: "worker pool closed".to_string(),
                },
            );
        };
        info!(instance = %instance.id, worker = %worker.name(), "Assigned instance");

        let workspace = match self.workspaces.prepare(&instance) {
            Ok(path) => path,
            Err(e) => {
                error!(instance = %instance.id, error = %e, "Workspace preparation failed");
                let mut result = InstanceResult::not_run(
                    &instance,
                    InstanceStatus::Errored {
                        reason: e.to_string(),
                    },
                );
                result.worker = Some(worker.name().to_string());
                return result;
            }
        };

        let request = PipelineRequest {
            timeout: instance.timeout.or(self.default_timeout),
            workspace: workspace.clone(),
            instance,
        };
        let outcome = worker.executor().run(&request).await;
        drop(permit);

        let instance = request.instance;
        info!(
            instance = %instance.id,
            worker = %worker.name(),
            status = %outcome.status,
            duration_ms = start.elapsed().as_millis(),
            "Instance finished"
        );

        InstanceResult {
            instance_id: instance.id,
            job_name: instance.job_name,
            binding: instance.binding,
            worker: Some(worker.name().to_string()),
            status: outcome.status,
            commands: outcome.commands,
            workspace: Some(workspace),
            artifacts: instance.artifacts,
            duration: start.elapsed(),
        }
    }
}

/// Claims the first free worker, waiting on all of them if every one is
/// busy
async fn claim_any<'a>(eligible: &[&'a Worker]) -> Option<(&'a Worker, OwnedSemaphorePermit)> {
    for worker in eligible {
        if let Some(permit) = worker.try_claim() {
            return Some((*worker, permit));
        }
    }

    debug!(candidates = eligible.len(), "All eligible workers busy, waiting");
    let waits = eligible
        .iter()
        .map(|worker| Box::pin(worker.claim()))
        .collect::<Vec<_>>();
    let (permit, index, _) = select_all(waits).await;
    permit.map(|permit| (eligible[index], permit))
}
