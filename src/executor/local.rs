use super::shell::{ShellCommand, ShellConfig};
use super::traits::{
    ExecutorCapabilities, HealthStatus, InstanceExecutor, PipelineOutcome, PipelineRequest,
};
use crate::job::{ExecutionError, InstanceStatus};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Local executor that runs commands on the host system
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    /// Shell configuration for every command
    shell: ShellConfig,
}

impl LocalExecutor {
    /// Creates a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shell configuration
    #[must_use]
    pub fn with_shell_config(mut self, shell: ShellConfig) -> Self {
        self.shell = shell;
        self
    }

    /// Shell configuration in use
    #[must_use]
    pub fn shell_config(&self) -> &ShellConfig {
        &self.shell
    }
}

#[async_trait]
impl InstanceExecutor for LocalExecutor {
    async fn run(&self, request: &PipelineRequest) -> PipelineOutcome {
        let instance = &request.instance;
        let mut env: BTreeMap<String, String> = instance.environment.vars().clone();
        env.insert(
            "WORKSPACE".to_string(),
            request.workspace.to_string_lossy().to_string(),
        );

        tracing::info!(
            instance = %instance.id,
            commands = instance.commands.len(),
            privileged = instance.privileged,
            "Starting instance pipeline"
        );

        // A timeout too large to represent as an instant never fires
        let deadline = request.timeout.and_then(|t| Instant::now().checked_add(t));
        let mut commands = Vec::with_capacity(instance.commands.len());

        for (index, command) in instance.commands.iter().enumerate() {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return timed_out(request, commands);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            let result = ShellCommand::new(&self.shell, &request.workspace, &env)
                .privileged(instance.privileged)
                .execute(command, remaining)
                .await;

            match result {
                Ok(result) => {
                    let exit_code = result.exit_code;
                    let failed = result.is_failure();
                    commands.push(result);

                    if failed {
                        tracing::warn!(
                            instance = %instance.id,
                            command_index = index,
                            exit_code,
                            "Command failed, skipping remaining commands"
                        );
                        return PipelineOutcome {
                            status: InstanceStatus::Failed {
                                exit_code,
                                command_index: index,
                            },
                            commands,
                        };
                    }
                }
                Err(ExecutionError::Timeout { .. }) => return timed_out(request, commands),
                Err(e) => {
                    tracing::error!(instance = %instance.id, error = %e, "Command could not run");
                    return PipelineOutcome {
                        status: InstanceStatus::Errored {
                            reason: e.to_string(),
                        },
                        commands,
                    };
                }
            }
        }

        PipelineOutcome {
            status: InstanceStatus::Succeeded,
            commands,
        }
    }

    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities {
            can_execute_shell: true,
            supports_privileged: !self.shell.privilege_wrapper.is_empty(),
            supports_timeout: true,
        }
    }

    async fn health_check(&self) -> HealthStatus {
        let dir = std::env::temp_dir();
        let env = BTreeMap::new();
        let result = ShellCommand::new(&self.shell, &dir, &env)
            .execute("true", Some(Duration::from_secs(5)))
            .await;

        match result {
            Ok(result) if result.is_success() && self.shell.privilege_wrapper.is_empty() => {
                HealthStatus::Degraded {
                    reason: "no privilege wrapper configured".to_string(),
                }
            }
            Ok(result) if result.is_success() => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy {
                reason: "Shell command returned non-zero exit code".to_string(),
            },
            Err(e) => HealthStatus::Unhealthy {
                reason: format!("Shell not available: {e}"),
            },
        }
    }
}

fn timed_out(request: &PipelineRequest, commands: Vec<super::shell::ShellResult>) -> PipelineOutcome {
    let after = request.timeout.unwrap_or_default();
    tracing::warn!(instance = %request.instance.id, ?after, "Instance timed out");
    PipelineOutcome {
        status: InstanceStatus::TimedOut { after },
        commands,
    }
}
