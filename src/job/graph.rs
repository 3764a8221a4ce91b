//! Job graph builder
//!
//! Walks the declarative `job_type -> job_name -> job` tree of a Job DSL
//! YAML document and produces immutable [`JobDefinition`]s. Fragment
//! references are resolved and flattened here, once, so nothing is
//! re-resolved at run time.
//!
//! ## Document shape
//!
//! ```yaml
//! fragments:
//!   hashbang: ["#!/bin/bash -l", "set -e"]
//! job_type:
//!   run_trial:
//!     run_trial_for_storage_driver:
//!       on_nodes_with_labels: aws-centos-7
//!       with_modules: [flocker.node]
//!       with_steps:
//!         - { type: shell, cli: [{ fragment: hashbang }, "trial ${MODULE}"] }
//! ```

use super::definition::{JobDefinition, ParameterAxis};
use super::errors::ConfigError;
use super::instance::GlobalEnvironment;
use super::template::{FragmentLine, TemplateRegistry};
use super::types::{Artifact, Validate};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Default coverage data file collected when `coverage_report` is set
pub const DEFAULT_COVERAGE_FILE: &str = "coverage.json";

/// Default test log collected when `publish_test_results` is set
pub const DEFAULT_TEST_LOG_FILE: &str = "test.log";

/// Raw configuration document as written by users
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    /// Project identifier
    #[serde(default)]
    pub project: Option<String>,
    /// Repository URL
    #[serde(default)]
    pub git_url: Option<String>,
    /// Variables exported to every instance
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Named fragments, in document order
    #[serde(default)]
    pub fragments: serde_yaml::Mapping,
    /// Job tree, in document order
    #[serde(default)]
    pub job_type: serde_yaml::Mapping,
}

impl RawConfig {
    /// Parses a YAML document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid YAML or
    /// does not have the expected shape.
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Reads and parses a YAML document from disk
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if it cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!(path = %path.display(), "Loading job configuration");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// A step entry: literal command, fragment reference, or shell block
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Literal(String),
    Reference {
        fragment: String,
    },
    Block {
        #[serde(rename = "type")]
        kind: String,
        cli: Vec<RawStep>,
    },
    Sequence(Vec<RawStep>),
}

/// Label constraint: one label or a list that must all match
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawLabels {
    One(String),
    Many(Vec<String>),
}

impl RawLabels {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(label) => vec![label],
            Self::Many(labels) => labels,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawParameter {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawJob {
    on_nodes_with_labels: Option<RawLabels>,
    with_modules: Option<Vec<String>>,
    with_parameters: Option<RawParameter>,
    with_steps: Option<Vec<RawStep>>,
    #[serde(default)]
    archive_artifacts: Vec<String>,
    #[serde(default)]
    coverage_report: bool,
    coverage_file: Option<String>,
    #[serde(default)]
    publish_test_results: bool,
    test_log_file: Option<String>,
    #[serde(default)]
    clean_repo: bool,
    #[serde(default)]
    run_as_root: bool,
    /// Minutes
    timeout: Option<u64>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
}

/// Resolved job graph: fragments plus flattened definitions
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    registry: TemplateRegistry,
    definitions: Vec<JobDefinition>,
    globals: GlobalEnvironment,
}

impl JobGraph {
    /// Parses and builds a graph from a YAML string
    ///
    /// # Errors
    ///
    /// Returns any [`ConfigError`] raised while parsing or building.
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        JobGraphBuilder::new().build(&RawConfig::from_yaml(input)?)
    }

    /// Reads, parses and builds a graph from a file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any
    /// parse/build error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        JobGraphBuilder::new().build(&RawConfig::load(path)?)
    }

    /// Definitions in declaration order
    #[must_use]
    pub fn definitions(&self) -> &[JobDefinition] {
        &self.definitions
    }

    /// Fragment registry the definitions were resolved against
    #[must_use]
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Job-wide settings
    #[must_use]
    pub fn globals(&self) -> &GlobalEnvironment {
        &self.globals
    }

    /// Finds a definition by name
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&JobDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Returns a graph restricted to the named jobs, keeping declaration
    /// order. An empty list keeps every job.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownJob`] if a name is not declared.
    pub fn filter(&self, names: &[String]) -> Result<Self, ConfigError> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        if let Some(missing) = names.iter().find(|n| self.find(n).is_none()) {
            return Err(ConfigError::UnknownJob {
                name: missing.clone(),
            });
        }

        let wanted: HashSet<&String> = names.iter().collect();
        Ok(Self {
            registry: self.registry.clone(),
            definitions: self
                .definitions
                .iter()
                .filter(|d| wanted.contains(&d.name))
                .cloned()
                .collect(),
            globals: self.globals.clone(),
        })
    }

    /// Sum over definitions of max(1, parameter values)
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.definitions.iter().map(JobDefinition::instance_count).sum()
    }
}

/// Builds a [`JobGraph`] from a [`RawConfig`]
#[derive(Debug, Clone, Default)]
pub struct JobGraphBuilder {
    extra_env: BTreeMap<String, String>,
}

impl JobGraphBuilder {
    /// Creates a builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global variable that overrides the document's `environment`
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.insert(key.into(), value.into());
        self
    }

    /// Resolves every fragment and job into a graph.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown or cyclic fragments, duplicate
    /// jobs, and jobs missing labels or steps.
    pub fn build(&self, raw: &RawConfig) -> Result<JobGraph, ConfigError> {
        let registry = Self::build_registry(&raw.fragments)?;

        let mut definitions = Vec::new();
        let mut seen = HashSet::new();

        for (type_key, jobs) in &raw.job_type {
            let job_type = mapping_key(type_key)?;
            let jobs = match jobs {
                serde_yaml::Value::Mapping(jobs) => jobs,
                serde_yaml::Value::Null => continue,
                _ => {
                    return Err(ConfigError::Parse(format!(
                        "job type '{job_type}' must map job names to jobs"
                    )));
                }
            };

            for (name_key, body) in jobs {
                let name = mapping_key(name_key)?;
                if !seen.insert(name.clone()) {
                    return Err(ConfigError::DuplicateJob { name });
                }

                let raw_job: RawJob = serde_yaml::from_value(body.clone())
                    .map_err(|e| ConfigError::malformed(&name, e.to_string()))?;
                let definition = Self::build_definition(&registry, &job_type, &name, raw_job)?;
                definition.validate()?;

                tracing::debug!(
                    job = %definition.name,
                    job_type = %definition.job_type,
                    commands = definition.commands.len(),
                    instances = definition.instance_count(),
                    "Built job definition"
                );
                definitions.push(definition);
            }
        }

        let mut globals = GlobalEnvironment {
            project: raw.project.clone(),
            git_url: raw.git_url.clone(),
            vars: raw.environment.clone(),
        };
        globals.merge(&self.extra_env);

        tracing::info!(
            fragments = registry.len(),
            jobs = definitions.len(),
            "Job graph built"
        );

        Ok(JobGraph {
            registry,
            definitions,
            globals,
        })
    }

    fn build_registry(fragments: &serde_yaml::Mapping) -> Result<TemplateRegistry, ConfigError> {
        let mut registry = TemplateRegistry::new();

        for (key, body) in fragments {
            let name = mapping_key(key)?;
            let step: RawStep = serde_yaml::from_value(body.clone())
                .map_err(|e| ConfigError::Parse(format!("fragment '{name}': {e}")))?;
            let mut lines = Vec::new();
            flatten(&name, step, &mut lines)?;
            registry.define(name, lines)?;
        }

        registry.validate()?;
        Ok(registry)
    }

    fn build_definition(
        registry: &TemplateRegistry,
        job_type: &str,
        name: &str,
        raw: RawJob,
    ) -> Result<JobDefinition, ConfigError> {
        let labels = raw
            .on_nodes_with_labels
            .map(RawLabels::into_vec)
            .ok_or_else(|| ConfigError::malformed(name, "missing on_nodes_with_labels"))?;
        let steps = raw
            .with_steps
            .ok_or_else(|| ConfigError::malformed(name, "missing with_steps"))?;

        let mut lines = Vec::new();
        for step in steps {
            flatten(name, step, &mut lines)?;
        }

        let mut commands = Vec::with_capacity(lines.len());
        for line in lines {
            match line {
                FragmentLine::Literal(text) => commands.push(text),
                FragmentLine::Include(fragment) => commands.extend(registry.resolve(&fragment)?),
            }
        }

        let parameter = match (raw.with_modules, raw.with_parameters) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::malformed(
                    name,
                    "with_modules and with_parameters are mutually exclusive",
                ));
            }
            (Some(modules), None) => Some(ParameterAxis::modules(modules)),
            (None, Some(param)) => Some(ParameterAxis::new(param.name, param.values)),
            (None, None) => None,
        };

        let mut artifacts: Vec<Artifact> = raw
            .archive_artifacts
            .into_iter()
            .map(Artifact::archive)
            .collect();
        if raw.coverage_report {
            artifacts.push(Artifact::coverage(
                raw.coverage_file
                    .unwrap_or_else(|| DEFAULT_COVERAGE_FILE.to_string()),
            ));
        }
        if raw.publish_test_results {
            artifacts.push(Artifact::test_log(
                raw.test_log_file
                    .unwrap_or_else(|| DEFAULT_TEST_LOG_FILE.to_string()),
            ));
        }

        let timeout = raw
            .timeout
            .map(|minutes| {
                minutes
                    .checked_mul(60)
                    .map(Duration::from_secs)
                    .ok_or_else(|| ConfigError::malformed(name, "timeout too large"))
            })
            .transpose()?;

        Ok(JobDefinition {
            name: name.to_string(),
            job_type: job_type.to_string(),
            labels,
            commands,
            parameter,
            artifacts,
            clean_repo: raw.clean_repo,
            privileged: raw.run_as_root,
            timeout,
            environment: raw.environment,
        })
    }
}

/// Flattens a raw step into fragment lines, preserving order
fn flatten(owner: &str, step: RawStep, out: &mut Vec<FragmentLine>) -> Result<(), ConfigError> {
    match step {
        RawStep::Literal(text) => out.push(FragmentLine::Literal(text)),
        RawStep::Reference { fragment } => out.push(FragmentLine::Include(fragment)),
        RawStep::Block { kind, cli } => {
            if kind != "shell" {
                return Err(ConfigError::malformed(
                    owner,
                    format!("unsupported step type '{kind}'"),
                ));
            }
            for inner in cli {
                flatten(owner, inner, out)?;
            }
        }
        RawStep::Sequence(steps) => {
            for inner in steps {
                flatten(owner, inner, out)?;
            }
        }
    }
    Ok(())
}

fn mapping_key(key: &serde_yaml::Value) -> Result<String, ConfigError> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Parse(format!("expected a string key, got {key:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::types::ArtifactKind;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r##"
project: ClusterHQ/flocker
environment:
  FLOCKER_BRANCH: master
fragments:
  hashbang: ["#!/bin/bash -l", "set -e"]
  setup_venv:
    - { fragment: hashbang }
    - "virtualenv venv"
job_type:
  run_trial:
    run_trial_for_storage_driver:
      on_nodes_with_labels: aws-centos-7
      with_modules: [flocker.node, flocker.volume]
      with_steps:
        - { type: shell, cli: [{ fragment: setup_venv }, "trial ${MODULE}"] }
      coverage_report: true
      publish_test_results: true
      clean_repo: true
  run_sphinx:
    run_sphinx:
      on_nodes_with_labels: [aws-centos-7, docs]
      with_steps:
        - "tox -e sphinx"
      archive_artifacts: ["docs/_build/**/*.html"]
      timeout: 10
"##;

    #[test]
    fn test_build_flattens_steps() {
        let graph = JobGraph::from_yaml(CONFIG).unwrap();
        let trial = graph.find("run_trial_for_storage_driver").unwrap();

        assert_eq!(
            trial.commands,
            vec![
                "#!/bin/bash -l",
                "set -e",
                "virtualenv venv",
                "trial ${MODULE}"
            ]
        );
        assert_eq!(trial.labels, vec!["aws-centos-7"]);
        assert!(trial.clean_repo);
        assert_eq!(
            trial.parameter.as_ref().unwrap().values,
            vec!["flocker.node", "flocker.volume"]
        );
    }

    #[test]
    fn test_build_preserves_declaration_order() {
        let graph = JobGraph::from_yaml(CONFIG).unwrap();
        let names: Vec<_> = graph.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["run_trial_for_storage_driver", "run_sphinx"]);
        assert_eq!(graph.instance_count(), 3);
    }

    #[test]
    fn test_build_artifacts_and_flags() {
        let graph = JobGraph::from_yaml(CONFIG).unwrap();

        let trial = graph.find("run_trial_for_storage_driver").unwrap();
        let kinds: Vec<_> = trial.artifacts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ArtifactKind::Coverage, ArtifactKind::TestLog]);

        let sphinx = graph.find("run_sphinx").unwrap();
        assert_eq!(sphinx.labels, vec!["aws-centos-7", "docs"]);
        assert_eq!(sphinx.timeout, Some(Duration::from_secs(600)));
        assert_eq!(sphinx.artifacts[0].kind, ArtifactKind::Archive);
    }

    #[test]
    fn test_globals_loaded() {
        let graph = JobGraphBuilder::new()
            .with_env("FLOCKER_BRANCH", "release/1.0")
            .build(&RawConfig::from_yaml(CONFIG).unwrap())
            .unwrap();
        assert_eq!(graph.globals().project.as_deref(), Some("ClusterHQ/flocker"));
        assert_eq!(graph.globals().vars["FLOCKER_BRANCH"], "release/1.0");
    }

    #[test]
    fn test_missing_labels_is_malformed() {
        let yaml = r#"
job_type:
  run_trial:
    broken:
      with_steps: ["echo hi"]
"#;
        let err = JobGraph::from_yaml(yaml).unwrap_err();
        assert_eq!(
            err,
            ConfigError::malformed("broken", "missing on_nodes_with_labels")
        );
    }

    #[test]
    fn test_missing_steps_is_malformed() {
        let yaml = r#"
job_type:
  run_trial:
    broken:
      on_nodes_with_labels: centos-7
"#;
        let err = JobGraph::from_yaml(yaml).unwrap_err();
        assert_eq!(err, ConfigError::malformed("broken", "missing with_steps"));
    }

    #[test]
    fn test_unknown_fragment_in_job() {
        let yaml = r#"
job_type:
  run_trial:
    broken:
      on_nodes_with_labels: centos-7
      with_steps: [{ fragment: nope }]
"#;
        let err = JobGraph::from_yaml(yaml).unwrap_err();
        assert_eq!(err, ConfigError::UnknownFragment { name: "nope".into() });
    }

    #[test]
    fn test_cyclic_fragments_fail_at_load() {
        let yaml = r#"
fragments:
  a: [{ fragment: b }]
  b: [{ fragment: a }]
job_type: {}
"#;
        let err = JobGraph::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicReference { .. }));
    }

    #[test]
    fn test_duplicate_job_across_types() {
        let yaml = r#"
job_type:
  run_trial:
    same: { on_nodes_with_labels: a, with_steps: ["true"] }
  run_lint:
    same: { on_nodes_with_labels: a, with_steps: ["true"] }
"#;
        let err = JobGraph::from_yaml(yaml).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateJob { name: "same".into() });
    }

    #[test]
    fn test_unsupported_step_type() {
        let yaml = r#"
job_type:
  run_trial:
    broken:
      on_nodes_with_labels: a
      with_steps: [{ type: python, cli: ["print(1)"] }]
"#;
        let err = JobGraph::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unsupported step type"));
    }

    #[test]
    fn test_yaml_anchors_are_expanded() {
        let yaml = r##"
common_cli:
  hashbang: &hashbang "#!/bin/bash -l"
  setup: &setup ["set -e", "cd ${WORKSPACE}"]
job_type:
  run_trial:
    anchored:
      on_nodes_with_labels: a
      with_steps:
        - { type: shell, cli: [*hashbang, *setup, "make"] }
"##;
        let graph = JobGraph::from_yaml(yaml).unwrap();
        assert_eq!(
            graph.find("anchored").unwrap().commands,
            vec!["#!/bin/bash -l", "set -e", "cd ${WORKSPACE}", "make"]
        );
    }

    #[test]
    fn test_with_parameters() {
        let yaml = r#"
job_type:
  run_acceptance:
    acceptance:
      on_nodes_with_labels: aws
      with_parameters: { name: DISTRIBUTION, values: [centos-7, ubuntu-14.04] }
      with_steps: ["run-acceptance-tests --distribution ${DISTRIBUTION}"]
"#;
        let graph = JobGraph::from_yaml(yaml).unwrap();
        let axis = graph.find("acceptance").unwrap().parameter.clone().unwrap();
        assert_eq!(axis.name, "DISTRIBUTION");
        assert_eq!(axis.values.len(), 2);
    }

    #[test]
    fn test_both_parameter_forms_rejected() {
        let yaml = r#"
job_type:
  run_trial:
    both:
      on_nodes_with_labels: a
      with_modules: [x]
      with_parameters: { name: Y, values: [y] }
      with_steps: ["true"]
"#;
        assert!(JobGraph::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_oversized_timeout_is_malformed() {
        let yaml = r#"
job_type:
  run_trial:
    forever:
      on_nodes_with_labels: a
      with_steps: ["true"]
      timeout: 307445734561825861
"#;
        let err = JobGraph::from_yaml(yaml).unwrap_err();
        assert_eq!(err, ConfigError::malformed("forever", "timeout too large"));
    }

    #[test]
    fn test_run_as_root() {
        let yaml = r#"
job_type:
  run_client:
    as_root:
      on_nodes_with_labels: a
      with_steps: ["yum install -y docker"]
      run_as_root: true
    as_user:
      on_nodes_with_labels: a
      with_steps: ["true"]
"#;
        let graph = JobGraph::from_yaml(yaml).unwrap();
        assert!(graph.find("as_root").unwrap().privileged);
        assert!(!graph.find("as_user").unwrap().privileged);
    }

    #[test]
    fn test_filter() {
        let graph = JobGraph::from_yaml(CONFIG).unwrap();
        let filtered = graph.filter(&["run_sphinx".to_string()]).unwrap();
        assert_eq!(filtered.definitions().len(), 1);

        let err = graph.filter(&["nope".to_string()]).unwrap_err();
        assert_eq!(err, ConfigError::UnknownJob { name: "nope".into() });
    }
}
