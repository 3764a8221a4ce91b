//! # jobline - declarative CI job orchestration
//!
//! jobline turns a YAML description of CI jobs into parameterised job
//! instances, runs them in parallel across labelled workers, and merges
//! their artifacts into a single summary.
//!
//! ## Data flow
//!
//! 1. [`TemplateRegistry`] holds named step fragments and resolves nested
//!    references, rejecting cycles.
//! 2. [`JobGraph`] flattens every job's steps into one command sequence.
//! 3. [`ParameterExpander`] fans each definition out into one
//!    [`JobInstance`] per parameter value.
//! 4. [`Dispatcher`] places each instance on a free worker whose labels
//!    cover the job's requirements and runs its pipeline there.
//! 5. [`Aggregator`] waits for every instance, then collects artifacts,
//!    merges coverage and counts test results into a [`Summary`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use jobline::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), JoblineError> {
//! let graph = JobGraph::from_yaml(r#"
//! job_type:
//!   run_trial:
//!     trial:
//!       on_nodes_with_labels: linux
//!       with_modules: [pkg.a, pkg.b]
//!       with_steps: ["trial ${MODULE}"]
//! "#)?;
//! let instances = ParameterExpander::for_graph(&graph).expand_all(&graph);
//!
//! let executor: Arc<dyn InstanceExecutor> = Arc::new(LocalExecutor::new());
//! let pool = WorkerPool::new().with_worker(Worker::new("local", ["linux"], executor));
//! let dispatcher = Dispatcher::new(pool, WorkspaceManager::new("/tmp/jobline"));
//!
//! let results = dispatcher.schedule(instances).await;
//! let summary = Aggregator::new().collect(&results);
//! assert_eq!(summary.total(), 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod aggregate;
pub mod executor;
pub mod infrastructure;
pub mod job;
pub mod worker;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use aggregate::{Aggregator, ArtifactWarning, CoverageReport, Summary, TestCounts};
pub use executor::{
    ExecutorCapabilities, HealthStatus, InstanceExecutor, LocalExecutor, ShellCommand,
    ShellConfig, ShellResult, WorkspaceManager, expand_variables,
};
pub use infrastructure::{Config, JobMetrics, MetricsCollector};
pub use job::{
    Artifact, ArtifactKind, ConfigError, ExecutionError, InstanceStatus, JobDefinition, JobGraph,
    JobGraphBuilder, JobInstance, JoblineError, ParameterAxis, ParameterExpander,
    SchedulingError, TemplateRegistry, Validate,
};
pub use worker::{Dispatcher, InstanceResult, Worker, WorkerInventory, WorkerPool};

/// Version of the jobline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
