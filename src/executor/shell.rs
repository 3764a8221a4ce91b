//! Shell execution
//!
//! Runs one command through `sh -c` inside an instance workspace, with:
//!
//! - Variable expansion (`${VAR}`) against the instance environment
//! - An explicit environment (only a few host variables such as `PATH`
//!   are inherited)
//! - Optional privilege wrapper (`sudo -n -E` by default)
//! - Deadline enforcement: a command still running at the deadline is
//!   killed
//!
//! ## Variable Expansion
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use jobline::expand_variables;
//!
//! let env = BTreeMap::from([("MODULE".to_string(), "flocker.node".to_string())]);
//! assert_eq!(expand_variables("trial ${MODULE}", &env), "trial flocker.node");
//! ```

use crate::job::ExecutionError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// Host variables passed through to every command
const INHERITED_VARS: &[&str] = &["PATH", "HOME", "USER", "LANG", "TMPDIR"];

/// Default privilege wrapper
pub const DEFAULT_PRIVILEGE_WRAPPER: &str = "sudo -n -E";

/// Shell execution configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Shell to use (default: sh)
    pub shell: String,

    /// Program and arguments prepended in privileged mode
    pub privilege_wrapper: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            privilege_wrapper: DEFAULT_PRIVILEGE_WRAPPER
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl ShellConfig {
    /// Parses a privilege wrapper such as `sudo -n -E` with shell quoting
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Spawn`] if the wrapper has unbalanced quotes.
    pub fn with_privilege_wrapper(mut self, wrapper: &str) -> Result<Self, ExecutionError> {
        self.privilege_wrapper =
            shell_words::split(wrapper).map_err(|e| ExecutionError::Spawn {
                command: wrapper.to_string(),
                reason: e.to_string(),
            })?;
        Ok(self)
    }

    /// Sets the shell
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

/// Result of one shell command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellResult {
    /// The command as run, after variable expansion
    pub command: String,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code (-1 when killed by a signal)
    pub exit_code: i32,

    /// Duration of execution
    pub duration: Duration,
}

impl ShellResult {
    /// Returns true if command succeeded (exit code 0)
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns true if command failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.exit_code != 0
    }
}

/// Builder for one shell command invocation
#[derive(Debug, Clone)]
pub struct ShellCommand<'a> {
    config: &'a ShellConfig,
    cwd: &'a Path,
    env: &'a BTreeMap<String, String>,
    privileged: bool,
}

impl<'a> ShellCommand<'a> {
    /// Creates a command running in `cwd` with exactly `env` (plus the
    /// inherited host variables)
    #[must_use]
    pub fn new(config: &'a ShellConfig, cwd: &'a Path, env: &'a BTreeMap<String, String>) -> Self {
        Self {
            config,
            cwd,
            env,
            privileged: false,
        }
    }

    /// Runs through the privilege wrapper
    #[must_use]
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Executes a command, killing it if it is still running after
    /// `limit`.
    ///
    /// A non-zero exit is not an error here: it is reported through
    /// [`ShellResult::exit_code`] so the caller decides what fails.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::PrivilegeUnavailable`] for a privileged
    /// command when no wrapper is configured,
    /// [`ExecutionError::Spawn`] if the process cannot start and
    /// [`ExecutionError::Timeout`] if `limit` elapses.
    pub async fn execute(
        &self,
        command: &str,
        limit: Option<Duration>,
    ) -> Result<ShellResult, ExecutionError> {
        let expanded = expand_variables(command, self.env);
        if self.privileged && self.config.privilege_wrapper.is_empty() {
            return Err(ExecutionError::PrivilegeUnavailable { command: expanded });
        }
        let mut cmd = self.build(&expanded);

        tracing::debug!(command = %expanded, cwd = %self.cwd.display(), privileged = self.privileged, "Executing shell command");

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
            command: expanded.clone(),
            reason: e.to_string(),
        })?;

        let output = match limit {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ExecutionError::Timeout { duration: limit })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| ExecutionError::Spawn {
            command: expanded.clone(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if exit_code != 0 {
            tracing::debug!(command = %expanded, exit_code, stderr = %stderr.trim(), "Shell command failed");
        }

        Ok(ShellResult {
            command: expanded,
            stdout,
            stderr,
            exit_code,
            duration: start.elapsed(),
        })
    }

    fn build(&self, command: &str) -> Command {
        let mut cmd = match self.config.privilege_wrapper.split_first() {
            Some((program, args)) if self.privileged => {
                let mut cmd = Command::new(program);
                cmd.args(args).arg(&self.config.shell);
                cmd
            }
            Some(_) | None => Command::new(&self.config.shell),
        };

        cmd.arg("-c");
        cmd.arg(command);
        cmd.current_dir(self.cwd);
        cmd.env_clear();
        for key in INHERITED_VARS {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(self.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Expands environment variables in a command string
///
/// Variables are expanded using the `${VAR_NAME}` syntax.
/// If a variable is not found, it remains unchanged in the output.
pub fn expand_variables(input: &str, env: &BTreeMap<String, String>) -> String {
    static VAR_PATTERN: once_cell::sync::Lazy<Regex> =
        once_cell::sync::Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

    VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = caps.get(1).map_or("", |m| m.as_str());
            match env.get(var_name) {
                Some(value) => value.clone(),
                // Keep the original if not found
                None => caps
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_variables_simple() {
        let env = BTreeMap::from([
            ("MODULE".to_string(), "flocker.node".to_string()),
            ("PROJECT".to_string(), "flocker".to_string()),
        ]);

        let expanded = expand_variables("trial ${MODULE}", &env);
        assert_eq!(expanded, "trial flocker.node");
    }

    #[test]
    fn test_expand_variables_not_found() {
        let env = BTreeMap::from([("FOO".to_string(), "bar".to_string())]);

        let expanded = expand_variables("echo ${UNKNOWN} ${FOO}", &env);
        assert_eq!(expanded, "echo ${UNKNOWN} bar");
    }

    #[test]
    fn test_expand_variables_leaves_plain_dollar() {
        let env = BTreeMap::from([("FOO".to_string(), "bar".to_string())]);
        assert_eq!(expand_variables("echo $FOO $$", &env), "echo $FOO $$");
    }

    #[test]
    fn test_default_privilege_wrapper() {
        let config = ShellConfig::default();
        assert_eq!(config.privilege_wrapper, vec!["sudo", "-n", "-E"]);
    }

    #[test]
    fn test_privilege_wrapper_quoting() {
        let config = ShellConfig::default()
            .with_privilege_wrapper("doas -u 'build user'")
            .unwrap();
        assert_eq!(config.privilege_wrapper, vec!["doas", "-u", "build user"]);
        assert!(
            ShellConfig::default()
                .with_privilege_wrapper("sudo 'unterminated")
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_execute_captures_output() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::default();
        let env = BTreeMap::from([("GREETING".to_string(), "hello".to_string())]);

        let result = ShellCommand::new(&config, dir.path(), &env)
            .execute("echo ${GREETING}; echo oops >&2", None)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_execute_sees_exported_env() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::default();
        let env = BTreeMap::from([("MODULE".to_string(), "flocker.node".to_string())]);

        let result = ShellCommand::new(&config, dir.path(), &env)
            .execute("printf %s \"$MODULE\"", None)
            .await
            .unwrap();
        assert_eq!(result.stdout, "flocker.node");
    }

    #[tokio::test]
    async fn test_execute_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::default();
        let env = BTreeMap::new();

        let result = ShellCommand::new(&config, dir.path(), &env)
            .execute("exit 3", None)
            .await
            .unwrap();
        assert!(result.is_failure());
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_execute_runs_in_cwd() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::default();
        let env = BTreeMap::new();

        ShellCommand::new(&config, dir.path(), &env)
            .execute("touch marker", None)
            .await
            .unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::default();
        let env = BTreeMap::new();

        let err = ShellCommand::new(&config, dir.path(), &env)
            .execute("sleep 5", Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_privileged_runs_through_wrapper() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::default()
            .with_privilege_wrapper("env PRIV=1")
            .unwrap();
        let env = BTreeMap::new();

        let result = ShellCommand::new(&config, dir.path(), &env)
            .privileged(true)
            .execute("printf %s \"$PRIV\"", None)
            .await
            .unwrap();
        assert_eq!(result.stdout, "1");

        let result = ShellCommand::new(&config, dir.path(), &env)
            .execute("printf %s \"$PRIV\"", None)
            .await
            .unwrap();
        assert_eq!(result.stdout, "");
    }

    #[tokio::test]
    async fn test_privileged_without_wrapper_refuses_to_run() {
        let dir = TempDir::new().unwrap();
        let config = ShellConfig::default().with_privilege_wrapper("").unwrap();
        let env = BTreeMap::new();

        let err = ShellCommand::new(&config, dir.path(), &env)
            .privileged(true)
            .execute("touch marker", None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::PrivilegeUnavailable {
                command: "touch marker".to_string()
            }
        );
        assert!(!dir.path().join("marker").exists());
    }

    #[test]
    fn test_shell_result_is_success() {
        let result = ShellResult {
            command: "true".to_string(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        };
        assert!(result.is_success());
        assert!(!result.is_failure());
    }
}
