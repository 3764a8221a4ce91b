//! Infrastructure layer
//!
//! Application configuration, logging setup and execution metrics.

mod config;
mod logging;
mod metrics;

pub use config::{Config, DEFAULT_CONFIG_FILE};
pub use logging::{LOG_ENV, init_logging};
pub use metrics::{JobMetrics, MetricsCollector};
