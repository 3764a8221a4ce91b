//! Prelude module for common imports

pub use crate::job::{
    Artifact, ArtifactKind, ConfigError, ExecutionError, GlobalEnvironment, InstanceStatus,
    JobDefinition, JobGraph, JobGraphBuilder, JobInstance, JoblineError, ParameterAxis,
    ParameterBinding, ParameterExpander, SchedulingError, TemplateRegistry, Validate,
};

pub use crate::executor::{
    InstanceExecutor, LocalExecutor, PipelineOutcome, PipelineRequest, ShellConfig,
    WorkspaceManager,
};

pub use crate::worker::{Dispatcher, InstanceResult, Worker, WorkerInventory, WorkerPool};

pub use crate::aggregate::{Aggregator, ArtifactWarning, CoverageReport, Summary, TestCounts};
