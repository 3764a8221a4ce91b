//! Instance execution traits
//!
//! This module defines the seam between the dispatcher and the hosts that
//! actually run commands.

use super::shell::ShellResult;
use crate::job::{InstanceStatus, JobInstance};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything an executor needs to run one instance pipeline
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Instance to run
    pub instance: JobInstance,

    /// Prepared workspace directory, exclusively owned by this instance
    pub workspace: PathBuf,

    /// Overall time budget for the pipeline
    pub timeout: Option<Duration>,
}

/// Outcome of one instance pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    /// Terminal status
    pub status: InstanceStatus,

    /// Commands that ran, in order; stops at the first failure
    pub commands: Vec<ShellResult>,
}

/// Trait for hosts that run instance pipelines
#[async_trait]
pub trait InstanceExecutor: Send + Sync + std::fmt::Debug {
    /// Runs the instance's commands sequentially, stopping at the first
    /// non-zero exit
    async fn run(&self, request: &PipelineRequest) -> PipelineOutcome;

    /// Returns the capabilities of this executor
    fn capabilities(&self) -> ExecutorCapabilities;

    /// Performs a health check
    async fn health_check(&self) -> HealthStatus;
}

/// Capabilities of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorCapabilities {
    /// Can execute shell commands
    pub can_execute_shell: bool,

    /// Can run commands through a privilege wrapper
    pub supports_privileged: bool,

    /// Enforces per-instance timeouts
    pub supports_timeout: bool,
}

impl Default for ExecutorCapabilities {
    fn default() -> Self {
        Self {
            can_execute_shell: true,
            supports_privileged: false,
            supports_timeout: true,
        }
    }
}

/// Health status of an executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Executor is healthy
    Healthy,

    /// Executor is degraded (some features unavailable)
    Degraded {
        /// Reason for degradation
        reason: String,
    },

    /// Executor is unhealthy
    Unhealthy {
        /// Reason for being unhealthy
        reason: String,
    },
}

impl HealthStatus {
    /// Returns true if executor is healthy or degraded
    #[must_use]
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unhealthy { .. })
    }
}
