//! jobline - declarative CI job orchestration
//!
//! ## Commands
//!
//! - `jobline check` - Load and validate a job configuration
//! - `jobline expand` - List the instances a configuration expands to
//! - `jobline run` - Run every instance and aggregate the results
//! - `jobline completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a configuration
//! jobline check jobs.yaml
//!
//! # See which instances it produces
//! jobline expand jobs.yaml --format json
//!
//! # Run on the workers of an inventory, writing a JUnit report
//! jobline run jobs.yaml --workers workers.yaml --junit results.xml
//!
//! # Generate shell completions
//! jobline completions bash > /etc/bash_completion.d/jobline
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("JOBLINE_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
