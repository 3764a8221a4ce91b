//! Worker pool management.
//!
//! A worker is an execution host advertising a set of capability labels.
//! Each worker runs at most one instance pipeline at a time.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::executor::InstanceExecutor;
use crate::job::ConfigError;

/// Worker entry of an inventory file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Unique worker name
    pub name: String,
    /// Advertised labels
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Worker inventory file
///
/// ```yaml
/// workers:
///   - name: centos-1
///     labels: [aws-centos-7, linux]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInventory {
    /// Workers in declaration order
    pub workers: Vec<WorkerSpec>,
}

impl WorkerInventory {
    /// Parses an inventory from YAML
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid YAML or duplicate names.
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        let inventory: Self = serde_yaml::from_str(input)?;

        let mut seen = HashSet::new();
        for worker in &inventory.workers {
            if !seen.insert(worker.name.as_str()) {
                return Err(ConfigError::Parse(format!(
                    "worker '{}' is declared more than once",
                    worker.name
                )));
            }
        }

        Ok(inventory)
    }

    /// Reads an inventory file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any parse
    /// error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// A single worker
#[derive(Clone)]
pub struct Worker {
    name: String,
    labels: BTreeSet<String>,
    executor: Arc<dyn InstanceExecutor>,
    slot: Arc<Semaphore>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Creates a worker backed by `executor`
    pub fn new<I, S>(name: impl Into<String>, labels: I, executor: Arc<dyn InstanceExecutor>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
            executor,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Worker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advertised labels
    #[must_use]
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// Executor running this worker's pipelines
    #[must_use]
    pub fn executor(&self) -> &Arc<dyn InstanceExecutor> {
        &self.executor
    }

    /// Returns true if the worker advertises every required label
    #[must_use]
    pub fn satisfies(&self, required: &[String]) -> bool {
        required.iter().all(|label| self.labels.contains(label))
    }

    /// Returns true while a pipeline holds the worker
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Claims the worker without waiting
    pub(crate) fn try_claim(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slot).try_acquire_owned().ok()
    }

    /// Waits until the worker is free and claims it
    pub(crate) async fn claim(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slot).acquire_owned().await.ok()
    }
}

/// Worker pool
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Creates an empty pool
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pool from an inventory, giving every worker the same
    /// executor
    #[must_use]
    pub fn from_inventory(inventory: &WorkerInventory, executor: &Arc<dyn InstanceExecutor>) -> Self {
        let workers = inventory
            .workers
            .iter()
            .map(|spec| Worker::new(&spec.name, &spec.labels, Arc::clone(executor)))
            .collect();
        Self { workers }
    }

    /// Adds a worker
    #[must_use]
    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.workers.push(worker);
        self
    }

    /// Workers whose labels are a superset of `required`, in pool order
    #[must_use]
    pub fn eligible(&self, required: &[String]) -> Vec<&Worker> {
        self.workers.iter().filter(|w| w.satisfies(required)).collect()
    }

    /// All workers
    #[must_use]
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Number of workers
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns true if the pool has no workers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
