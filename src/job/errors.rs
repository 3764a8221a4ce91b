//! Error types for the job domain

use std::time::Duration;
use thiserror::Error;

/// Top-level error for jobline operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoblineError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An instance pipeline did not complete successfully
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for JoblineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors raised while loading job configuration.
///
/// All of these are fatal and surface before any scheduling begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A step referenced a fragment that was never defined
    #[error("Unknown fragment '{name}'")]
    UnknownFragment {
        /// Name of the missing fragment.
        name: String,
    },

    /// Fragment inclusion forms a cycle
    #[error("Cyclic fragment reference: {}", chain.join(" -> "))]
    CyclicReference {
        /// Fragment names along the cycle, first name repeated at the end.
        chain: Vec<String>,
    },

    /// Fragment defined twice
    #[error("Fragment '{name}' is already defined")]
    DuplicateFragment {
        /// Name of the fragment.
        name: String,
    },

    /// Job name declared twice
    #[error("Job '{name}' is declared more than once")]
    DuplicateJob {
        /// Name of the job.
        name: String,
    },

    /// Job is missing a required field or has an invalid one
    #[error("Malformed job '{job}': {reason}")]
    MalformedJobSpec {
        /// Name of the job.
        job: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A requested job does not exist in the graph
    #[error("Unknown job '{name}'")]
    UnknownJob {
        /// Name that was requested.
        name: String,
    },

    /// Document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error while reading configuration
    #[error("IO error: {0}")]
    Io(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::MalformedJobSpec`]
    pub fn malformed(job: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedJobSpec {
            job: job.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Errors raised while placing an instance on a worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// No worker advertises every required label
    #[error("No eligible worker for instance '{instance}' (requires labels: {})", labels.join(", "))]
    NoEligibleWorker {
        /// Instance that could not be placed.
        instance: String,
        /// Labels it requires.
        labels: Vec<String>,
    },
}

/// Errors raised while running an instance pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Privileged command requested but no privilege wrapper is configured
    #[error("Cannot run '{command}' privileged: no privilege wrapper configured")]
    PrivilegeUnavailable {
        /// The command that required elevation.
        command: String,
    },

    /// Instance exceeded its timeout
    #[error("Timeout after {duration:?}")]
    Timeout {
        /// Duration before timeout.
        duration: Duration,
    },

    /// Command could not be started
    #[error("Failed to spawn '{command}': {reason}")]
    Spawn {
        /// The command that could not start.
        command: String,
        /// Underlying error.
        reason: String,
    },

    /// Workspace preparation failed
    #[error("Workspace error: {0}")]
    Workspace(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_reference_display() {
        let err = ConfigError::CyclicReference {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Cyclic fragment reference: a -> b -> a");
    }

    #[test]
    fn test_no_eligible_worker_display() {
        let err = SchedulingError::NoEligibleWorker {
            instance: "trial/flocker.node".into(),
            labels: vec!["centos-7".into()],
        };
        assert!(err.to_string().contains("centos-7"));
    }

    #[test]
    fn test_config_error_converts_into_top_level() {
        let err: JoblineError = ConfigError::UnknownFragment {
            name: "hashbang".into(),
        }
        .into();
        assert!(matches!(err, JoblineError::Config(_)));
    }
}
