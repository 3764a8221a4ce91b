//! Parameter expansion
//!
//! Turns each [`JobDefinition`] into one [`JobInstance`] per parameter
//! value, or exactly one instance when the job is not parameterized.
//! Emission order follows declaration order so scheduling is reproducible.

use super::definition::JobDefinition;
use super::graph::JobGraph;
use super::instance::{GlobalEnvironment, InstanceEnvironment, JobInstance, ParameterBinding};

/// Expands definitions into instances
#[derive(Debug, Clone, Default)]
pub struct ParameterExpander {
    globals: GlobalEnvironment,
}

impl ParameterExpander {
    /// Creates an expander that exports `globals` to every instance
    #[must_use]
    pub fn new(globals: GlobalEnvironment) -> Self {
        Self { globals }
    }

    /// Creates an expander using the graph's global settings
    #[must_use]
    pub fn for_graph(graph: &JobGraph) -> Self {
        Self::new(graph.globals().clone())
    }

    /// Expands one definition
    #[must_use]
    pub fn expand(&self, definition: &JobDefinition) -> Vec<JobInstance> {
        match &definition.parameter {
            Some(axis) if !axis.values.is_empty() => axis
                .values
                .iter()
                .map(|value| {
                    let binding = ParameterBinding {
                        name: axis.name.clone(),
                        value: value.clone(),
                    };
                    self.instance(definition, Some(binding))
                })
                .collect(),
            _ => vec![self.instance(definition, None)],
        }
    }

    /// Expands every definition of a graph, in declaration order
    #[must_use]
    pub fn expand_all(&self, graph: &JobGraph) -> Vec<JobInstance> {
        let instances: Vec<JobInstance> = graph
            .definitions()
            .iter()
            .flat_map(|definition| self.expand(definition))
            .collect();

        tracing::debug!(
            jobs = graph.definitions().len(),
            instances = instances.len(),
            "Expanded job graph"
        );
        instances
    }

    fn instance(&self, definition: &JobDefinition, binding: Option<ParameterBinding>) -> JobInstance {
        let id = match &binding {
            Some(binding) => format!("{}/{}", definition.name, binding.value),
            None => definition.name.clone(),
        };
        let environment =
            InstanceEnvironment::build(&self.globals, definition, &id, binding.as_ref());

        JobInstance {
            id,
            job_name: definition.name.clone(),
            job_type: definition.job_type.clone(),
            labels: definition.labels.clone(),
            commands: definition.commands.clone(),
            binding,
            environment,
            artifacts: definition.artifacts.clone(),
            clean_repo: definition.clean_repo,
            privileged: definition.privileged,
            timeout: definition.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::definition::ParameterAxis;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn definition(modules: Option<Vec<String>>) -> JobDefinition {
        let def = JobDefinition::new(
            "run_trial",
            "run_trial",
            vec!["centos-7".into()],
            vec!["echo ${MODULE}".into()],
        );
        match modules {
            Some(values) => def.with_parameter(ParameterAxis::modules(values)),
            None => def,
        }
    }

    #[test]
    fn test_unparameterized_yields_one_instance() {
        let instances = ParameterExpander::default().expand(&definition(None));
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, "run_trial");
        assert!(instances[0].binding.is_none());
    }

    #[test]
    fn test_three_modules_yield_three_instances_in_order() {
        let modules = vec![
            "flocker.node".to_string(),
            "flocker.volume".to_string(),
            "flocker.control".to_string(),
        ];
        let instances = ParameterExpander::default().expand(&definition(Some(modules.clone())));

        let bound: Vec<_> = instances
            .iter()
            .map(|i| i.environment.get("MODULE").cloned().unwrap())
            .collect();
        assert_eq!(bound, modules);
        assert_eq!(instances[1].id, "run_trial/flocker.volume");
        assert_eq!(instances[1].labels, vec!["centos-7"]);
    }

    #[test]
    fn test_expand_all_matches_graph_count() {
        let graph = JobGraph::from_yaml(
            r#"
job_type:
  run_trial:
    a: { on_nodes_with_labels: x, with_modules: [m1, m2], with_steps: ["true"] }
    b: { on_nodes_with_labels: x, with_steps: ["true"] }
  run_lint:
    c: { on_nodes_with_labels: y, with_modules: [m1, m2, m3], with_steps: ["true"] }
"#,
        )
        .unwrap();

        let instances = ParameterExpander::for_graph(&graph).expand_all(&graph);
        assert_eq!(instances.len(), graph.instance_count());
        assert_eq!(instances.len(), 6);
        let ids: Vec<_> = instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a/m1", "a/m2", "b", "c/m1", "c/m2", "c/m3"]);
    }

    proptest! {
        #[test]
        fn prop_expand_yields_distinct_bindings(
            values in proptest::collection::hash_set("[a-z][a-z0-9._]{0,12}", 1..16)
        ) {
            let values: Vec<String> = values.into_iter().collect();
            let instances = ParameterExpander::default().expand(&definition(Some(values.clone())));

            prop_assert_eq!(instances.len(), values.len());
            let bound: Vec<String> = instances
                .iter()
                .map(|i| i.binding.clone().unwrap().value)
                .collect();
            prop_assert_eq!(&bound, &values);
            let distinct: HashSet<_> = bound.iter().collect();
            prop_assert_eq!(distinct.len(), values.len());
        }
    }
}
