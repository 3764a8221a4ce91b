//! Job domain types and logic
//!
//! Data flows through this module in one direction:
//! fragments ([`template`]) are flattened into definitions ([`graph`]),
//! and definitions are expanded into instances ([`expand`]).

pub mod definition;
pub mod errors;
pub mod expand;
pub mod graph;
pub mod instance;
pub mod template;
pub mod types;

#[cfg(test)]
mod types_tests;

pub use definition::{JobDefinition, MODULE_PARAMETER, ParameterAxis};
pub use errors::{ConfigError, ExecutionError, JoblineError, SchedulingError};
pub use expand::ParameterExpander;
pub use graph::{JobGraph, JobGraphBuilder, RawConfig};
pub use instance::{GlobalEnvironment, InstanceEnvironment, JobInstance, ParameterBinding};
pub use template::{FragmentLine, StepFragment, TemplateRegistry};
pub use types::{Artifact, ArtifactKind, InstanceStatus, Validate};
