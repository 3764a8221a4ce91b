//! Logging configuration
//!
//! Initializes tracing for the application. `JOBLINE_LOG` takes precedence
//! over `RUST_LOG`; both override the configured level.

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding a jobline-specific filter
pub const LOG_ENV: &str = "JOBLINE_LOG";

/// Initializes logging with the specified level
///
/// Logs go to stderr so that `--format json` output on stdout stays clean.
/// Calling this more than once keeps the first subscriber.
pub fn init_logging(level: &str) {
    let _ = fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level))
}
