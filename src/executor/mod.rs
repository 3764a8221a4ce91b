//! Instance execution layer
//!
//! This module contains the executor trait and the local shell executor
//! that runs instance pipelines in isolated workspaces.

mod local;
mod shell;
mod traits;
mod workspace;

pub use local::LocalExecutor;
pub use shell::{
    DEFAULT_PRIVILEGE_WRAPPER, ShellCommand, ShellConfig, ShellResult, expand_variables,
};
pub use traits::{
    ExecutorCapabilities, HealthStatus, InstanceExecutor, PipelineOutcome, PipelineRequest,
};
pub use workspace::WorkspaceManager;
