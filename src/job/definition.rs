//! Job definitions
//!
//! A [`JobDefinition`] is the resolved, immutable form of one entry in the
//! job tree. All fragment references are already flattened into
//! [`commands`](JobDefinition::commands).

use super::errors::ConfigError;
use super::types::{Artifact, Validate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Parameter bound by `MODULE` when a job declares `with_modules`
pub const MODULE_PARAMETER: &str = "MODULE";

/// A single parameter axis a job is expanded over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterAxis {
    /// Environment variable the value is bound to
    pub name: String,
    /// Values in declaration order
    pub values: Vec<String>,
}

impl ParameterAxis {
    /// Creates an axis
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Creates the `MODULE` axis used by `with_modules`
    #[must_use]
    pub fn modules(values: Vec<String>) -> Self {
        Self::new(MODULE_PARAMETER, values)
    }
}

/// A declared, parameterizable unit of CI work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Job name, unique across job types
    pub name: String,
    /// Job type the job was declared under (e.g. `run_trial`)
    pub job_type: String,
    /// Labels a worker must advertise
    pub labels: Vec<String>,
    /// Flattened command list
    pub commands: Vec<String>,
    /// Optional parameter axis
    pub parameter: Option<ParameterAxis>,
    /// Declared artifacts
    pub artifacts: Vec<Artifact>,
    /// Wipe the instance workspace before running
    pub clean_repo: bool,
    /// Run commands through the privilege wrapper
    pub privileged: bool,
    /// Per-instance timeout overriding the global one
    pub timeout: Option<Duration>,
    /// Job-level environment variables
    pub environment: BTreeMap<String, String>,
}

impl JobDefinition {
    /// Creates a definition with the required fields
    pub fn new(
        name: impl Into<String>,
        job_type: impl Into<String>,
        labels: Vec<String>,
        commands: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            job_type: job_type.into(),
            labels,
            commands,
            parameter: None,
            artifacts: Vec::new(),
            clean_repo: false,
            privileged: false,
            timeout: None,
            environment: BTreeMap::new(),
        }
    }

    /// Sets the parameter axis
    #[must_use]
    pub fn with_parameter(mut self, axis: ParameterAxis) -> Self {
        self.parameter = Some(axis);
        self
    }

    /// Adds an artifact
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Sets the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Marks the job as privileged
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Number of instances this definition expands to
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.parameter
            .as_ref()
            .map_or(1, |axis| axis.values.len().max(1))
    }
}

impl Validate for JobDefinition {
    type Error = ConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::malformed(&self.name, "job name is empty"));
        }
        if self.labels.is_empty() || self.labels.iter().any(|l| l.trim().is_empty()) {
            return Err(ConfigError::malformed(
                &self.name,
                "missing on_nodes_with_labels",
            ));
        }
        if self.commands.is_empty() {
            return Err(ConfigError::malformed(&self.name, "missing with_steps"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::malformed(&self.name, "timeout must be positive"));
        }

        if let Some(axis) = &self.parameter {
            if axis.name.trim().is_empty() {
                return Err(ConfigError::malformed(&self.name, "parameter name is empty"));
            }
            if axis.values.is_empty() {
                return Err(ConfigError::malformed(
                    &self.name,
                    format!("parameter '{}' has no values", axis.name),
                ));
            }
            let mut seen = HashSet::new();
            for value in &axis.values {
                if !seen.insert(value) {
                    return Err(ConfigError::malformed(
                        &self.name,
                        format!("duplicate value '{}' for parameter '{}'", value, axis.name),
                    ));
                }
            }
        }

        Ok(())
    }
}
