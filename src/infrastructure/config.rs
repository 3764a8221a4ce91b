//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::executor::{DEFAULT_PRIVILEGE_WRAPPER, ShellConfig};
use crate::job::ConfigError;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "jobline.yaml";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one workspace per instance
    pub workspace_root: PathBuf,
    /// Directory collected artifacts are copied into, if set
    pub artifact_dir: Option<PathBuf>,
    /// Per-instance timeout applied to jobs without their own
    pub instance_timeout_secs: Option<u64>,
    /// Shell used to run each command
    pub shell: String,
    /// Command prefix for privileged jobs
    pub privilege_wrapper: String,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from(".jobline/workspaces"),
            artifact_dir: None,
            instance_timeout_secs: None,
            shell: "sh".to_string(),
            privilege_wrapper: DEFAULT_PRIVILEGE_WRAPPER.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parses a configuration document; absent keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid YAML.
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Reads a configuration file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or any parse
    /// error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Reads `path` if given, else `jobline.yaml` if present, else defaults
    ///
    /// # Errors
    ///
    /// Returns any error from [`Config::load`].
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    /// Per-instance timeout
    #[must_use]
    pub fn instance_timeout(&self) -> Option<Duration> {
        self.instance_timeout_secs.map(Duration::from_secs)
    }

    /// Shell settings for executors
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `privilege_wrapper` has unbalanced
    /// quotes.
    pub fn shell_config(&self) -> Result<ShellConfig, ConfigError> {
        ShellConfig::default()
            .with_shell(&self.shell)
            .with_privilege_wrapper(&self.privilege_wrapper)
            .map_err(|e| ConfigError::Parse(format!("privilege_wrapper: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.shell, "sh");
        assert_eq!(config.log_level, "info");
        assert!(config.instance_timeout().is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("instance_timeout_secs: 90\nlog_level: debug\n").unwrap();
        assert_eq!(config.instance_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.workspace_root, PathBuf::from(".jobline/workspaces"));
        assert_eq!(config.privilege_wrapper, DEFAULT_PRIVILEGE_WRAPPER);
    }

    #[test]
    fn test_shell_config() {
        let config = Config {
            shell: "bash".into(),
            privilege_wrapper: "doas".into(),
            ..Config::default()
        };
        let shell = config.shell_config().unwrap();
        assert_eq!(shell.shell, "bash");
        assert_eq!(shell.privilege_wrapper, vec!["doas".to_string()]);

        let broken = Config {
            privilege_wrapper: "sudo \"-n".into(),
            ..Config::default()
        };
        assert!(broken.shell_config().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("shell: [unclosed").is_err());
    }
}
