//! `ssh`-based executor.
//!
//! Uses `tokio::process::Command` to shell out to `ssh`. SSH keys must be
//! pre-configured for batch mode. Commands for `localhost` run through
//! `sh -c` directly; container commands are wrapped in `docker exec`.

use async_trait::async_trait;
use ovn_kh_core::PhysicalNode;
use std::time::Duration;
use tokio::process::Command;

use super::{target_label, ExecError, OutputSink, RemoteExecutor};

/// Default SSH connection timeout in seconds.
pub const SSH_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Executor that runs commands over `ssh`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    user: Option<String>,
    connect_timeout_secs: u64,
    command_timeout: Option<Duration>,
    log_cmds: bool,
}

impl Default for SshExecutor {
    fn default() -> Self {
        Self {
            user: None,
            connect_timeout_secs: SSH_CONNECT_TIMEOUT_SECS,
            command_timeout: None,
            log_cmds: false,
        }
    }
}

impl SshExecutor {
    /// Create an executor using the current user and no command timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log in as `user` instead of the current user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Kill commands that run longer than `timeout`.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Log every command at info level instead of debug.
    pub fn log_cmds(mut self, enabled: bool) -> Self {
        self.log_cmds = enabled;
        self
    }

    /// Build the process invocation for `cmd`.
    fn command_for(&self, host: &PhysicalNode, container: Option<&str>, cmd: &str) -> Command {
        let inner = match container {
            Some(container) => format!("docker exec {} sh -c {}", container, shell_quote(cmd)),
            None => cmd.to_string(),
        };

        let mut command = if host.is_local() {
            let mut command = Command::new("sh");
            command.args(["-c", &inner]);
            command
        } else {
            let destination = match &self.user {
                Some(user) => format!("{}@{}", user, host.hostname()),
                None => host.hostname().to_string(),
            };
            let mut command = Command::new("ssh");
            command.args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                &format!("ConnectTimeout={}", self.connect_timeout_secs),
                "-o",
                "BatchMode=yes",
                &destination,
                &inner,
            ]);
            command
        };
        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(
        &self,
        host: &PhysicalNode,
        container: Option<&str>,
        cmd: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<(), ExecError> {
        let target = target_label(host, container);
        if self.log_cmds {
            tracing::info!(on = %target, "{}", cmd);
        } else {
            tracing::debug!(on = %target, "{}", cmd);
        }

        let mut command = self.command_for(host, container, cmd);
        let output = match self.command_timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| ExecError::Timeout {
                    target: target.clone(),
                    secs: timeout.as_secs(),
                })?,
            None => command.output().await,
        }
        .map_err(|source| ExecError::Spawn {
            target: target.clone(),
            source,
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            sink.write_line(line);
        }

        if !output.status.success() {
            return Err(ExecError::CommandFailed {
                target,
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Quote `s` as a single POSIX shell word.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
