//! Core value types for the job domain
//!
//! This module contains the outcome types shared by the dispatcher and
//! the aggregator.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminal status of a job instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Every command exited with code 0
    Succeeded,
    /// A command exited non-zero; later commands were not run
    Failed {
        /// Exit code of the failing command.
        exit_code: i32,
        /// Zero-based index of the failing command.
        command_index: usize,
    },
    /// The instance was killed after exceeding its timeout
    TimedOut {
        /// Timeout that was exceeded.
        after: Duration,
    },
    /// No worker advertised the required labels
    NoEligibleWorker {
        /// Labels the instance required.
        labels: Vec<String>,
    },
    /// The pipeline could not run at all (spawn or workspace failure)
    Errored {
        /// Human readable reason.
        reason: String,
    },
}

impl InstanceStatus {
    /// Returns true if the instance succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true for every non-success status, timeouts included
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Returns true if the instance never reached a worker
    #[must_use]
    pub fn is_unscheduled(&self) -> bool {
        matches!(self, Self::NoEligibleWorker { .. })
    }

    /// Returns true if the instance timed out
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "SUCCESS"),
            Self::Failed { .. } => write!(f, "FAILURE"),
            Self::TimedOut { .. } => write!(f, "TIMEOUT"),
            Self::NoEligibleWorker { .. } => write!(f, "UNSCHEDULED"),
            Self::Errored { .. } => write!(f, "ERROR"),
        }
    }
}

/// Kind of a declared artifact, which decides how the aggregator reads it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Archived as-is
    Archive,
    /// Coverage data merged across instances
    Coverage,
    /// Test log converted into pass/fail/skip counts
    TestLog,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Coverage => write!(f, "coverage"),
            Self::TestLog => write!(f, "test-log"),
        }
    }
}

/// A named output file pattern declared by a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Display name
    pub name: String,
    /// Glob pattern relative to the instance workspace
    pub pattern: String,
    /// How the aggregator treats matches
    pub kind: ArtifactKind,
}

impl Artifact {
    /// Creates an archive artifact named after its pattern
    #[must_use]
    pub fn archive(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self {
            name: pattern.clone(),
            pattern,
            kind: ArtifactKind::Archive,
        }
    }

    /// Creates a coverage artifact
    #[must_use]
    pub fn coverage(pattern: impl Into<String>) -> Self {
        Self {
            name: "coverage".to_string(),
            pattern: pattern.into(),
            kind: ArtifactKind::Coverage,
        }
    }

    /// Creates a test log artifact
    #[must_use]
    pub fn test_log(pattern: impl Into<String>) -> Self {
        Self {
            name: "test-results".to_string(),
            pattern: pattern.into(),
            kind: ArtifactKind::TestLog,
        }
    }
}

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}
