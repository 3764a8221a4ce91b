//! Result aggregation
//!
//! - `coverage`: coverage artifact parsing and merging
//! - `junit`: test-log parsing and JUnit XML rendering
//! - `summary`: the aggregator and the batch summary

pub mod coverage;
pub mod junit;
pub mod summary;

pub use coverage::{CoverageReport, FileCoverage};
pub use junit::{TestCase, TestCounts, TestOutcome, TestSuite, parse_test_log};
pub use summary::{Aggregator, ArtifactWarning, CollectedArtifact, InstanceSummary, Summary};
