//! CLI for jobline
//!
//! - `check`: Load and validate a job configuration
//! - `expand`: List the instances a configuration expands to
//! - `run`: Run every instance and print the aggregate summary
//! - `completions`: Generate shell completions

pub mod check;
pub mod completions;
pub mod expand;
pub mod run;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use jobline::infrastructure::{Config, init_logging};
use std::path::PathBuf;
use std::process::ExitCode;

/// CLI arguments for jobline
#[derive(Parser, Debug)]
#[command(name = "jobline")]
#[command(author, version, about = "Declarative CI job orchestration", long_about = None)]
pub struct Args {
    /// Application config file (defaults to ./jobline.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overridden by JOBLINE_LOG or RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a job configuration
    Check {
        /// Job configuration file
        file: PathBuf,
    },

    /// List the instances a job configuration expands to
    Expand {
        /// Job configuration file
        file: PathBuf,
        /// Only expand these jobs
        #[arg(short, long = "job")]
        jobs: Vec<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run every instance and aggregate the results
    Run(run::RunArgs),

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Output format of `expand` and `run`
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable text
    Text,
    /// JSON document
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Parse and execute CLI arguments
pub fn run() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::discover(args.config.as_deref()).context("Failed to load config")?;
    init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));

    match args.command {
        Command::Check { file } => {
            let report = check::check_config(&file)?;
            print!("{report}");
        }
        Command::Expand { file, jobs, format } => {
            println!("{}", expand::expand_config(&file, &jobs, format)?);
        }
        Command::Run(run_args) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            let success = runtime.block_on(run::run_batch(run_args, &config))?;
            if !success {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let completions = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&completions, &output_path)?;
            } else {
                println!("{completions}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let args = Args::try_parse_from([
            "jobline",
            "run",
            "jobs.yaml",
            "--label",
            "linux",
            "--env",
            "A=1",
            "--job",
            "trial",
            "--format",
            "json",
            "--dry-run",
        ])
        .unwrap();
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.labels, vec!["linux"]);
        assert_eq!(run.env, vec![("A".to_string(), "1".to_string())]);
        assert!(run.dry_run);
        assert_eq!(run.format, OutputFormat::Json);
    }
}
