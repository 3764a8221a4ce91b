//! Job instances and their environment
//!
//! An instance is one concrete run of a [`JobDefinition`] bound to at most
//! one parameter value. Everything the pipeline needs is carried on the
//! instance itself; nothing is read from ambient process state.

use super::definition::JobDefinition;
use super::types::Artifact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

/// Job-wide settings shared by every instance of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalEnvironment {
    /// Project identifier, exported as `PROJECT`
    pub project: Option<String>,
    /// Repository URL, exported as `GIT_URL`
    pub git_url: Option<String>,
    /// Variables exported to every instance
    pub vars: BTreeMap<String, String>,
}

impl GlobalEnvironment {
    /// Creates an empty global environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable, replacing any previous value
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Merges variables from `other`, which win on conflict
    pub fn merge(&mut self, other: &BTreeMap<String, String>) {
        for (key, value) in other {
            self.vars.insert(key.clone(), value.clone());
        }
    }
}

/// Variables visible to one instance's commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEnvironment {
    vars: BTreeMap<String, String>,
}

impl InstanceEnvironment {
    /// Builds the environment for an instance.
    ///
    /// Precedence, lowest first: global variables, job variables, then the
    /// built-in `JOB_*`/`INSTANCE_ID` variables and the parameter binding.
    #[must_use]
    pub fn build(
        globals: &GlobalEnvironment,
        definition: &JobDefinition,
        instance_id: &str,
        binding: Option<&ParameterBinding>,
    ) -> Self {
        let mut vars = globals.vars.clone();
        if let Some(project) = &globals.project {
            vars.insert("PROJECT".to_string(), project.clone());
        }
        if let Some(git_url) = &globals.git_url {
            vars.insert("GIT_URL".to_string(), git_url.clone());
        }
        vars.extend(definition.environment.clone());
        vars.insert("JOB_NAME".to_string(), definition.name.clone());
        vars.insert("JOB_TYPE".to_string(), definition.job_type.clone());
        vars.insert("INSTANCE_ID".to_string(), instance_id.to_string());
        if let Some(binding) = binding {
            vars.insert(binding.name.clone(), binding.value.clone());
        }
        Self { vars }
    }

    /// Gets a variable
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&String> {
        self.vars.get(key)
    }

    /// Sets a variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// All variables, sorted by name
    #[must_use]
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

/// The parameter value an instance is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterBinding {
    /// Variable name
    pub name: String,
    /// Bound value
    pub value: String,
}

/// One concrete, parameter-bound execution of a job definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    /// Deterministic id: `<job>` or `<job>/<value>`
    pub id: String,
    /// Definition the instance came from
    pub job_name: String,
    /// Job type of the definition
    pub job_type: String,
    /// Labels a worker must advertise
    pub labels: Vec<String>,
    /// Commands run in order, fail-fast
    pub commands: Vec<String>,
    /// Parameter binding, if the job is parameterized
    pub binding: Option<ParameterBinding>,
    /// Variables exported to commands
    pub environment: InstanceEnvironment,
    /// Artifacts collected after completion
    pub artifacts: Vec<Artifact>,
    /// Wipe the workspace before running
    pub clean_repo: bool,
    /// Run commands through the privilege wrapper
    pub privileged: bool,
    /// Timeout overriding the global one
    pub timeout: Option<Duration>,
}

impl JobInstance {
    /// Relative workspace directory for this instance
    ///
    /// Distinct `(job, value)` pairs always map to distinct directories.
    #[must_use]
    pub fn workspace_dir(&self) -> String {
        relative_workspace(&self.job_name, self.binding.as_ref())
    }

    /// Label shown in logs and reports, e.g. `run_trial[MODULE=flocker.node]`
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.binding {
            Some(binding) => format!("{}[{}={}]", self.job_name, binding.name, binding.value),
            None => self.job_name.clone(),
        }
    }
}

/// Relative workspace directory of a job and optional binding
pub(crate) fn relative_workspace(job_name: &str, binding: Option<&ParameterBinding>) -> String {
    let job = encode_path_segment(job_name);
    match binding {
        Some(binding) => format!("{}/{}", job, encode_path_segment(&binding.value)),
        None => job,
    }
}

/// Encodes a value as a single path segment.
///
/// `[A-Za-z0-9-_.]` pass through, every other byte becomes `%XX`. The
/// segments `""`, `.` and `..` are encoded too, so the mapping is
/// injective and never escapes its parent directory.
pub(crate) fn encode_path_segment(segment: &str) -> String {
    match segment {
        "" => return "%".to_string(),
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {}
    }

    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}
