//! CLI command implementations.

pub mod inventory;
pub mod provision;
pub mod run;

use anyhow::{Context, Result};
use ovn_kh_runner::{Deployment, SshExecutor};
use std::path::Path;
use std::time::Duration;

use crate::ExecOpts;

/// Load a deployment, applying `--user`.
pub fn load_deployment(opts: &ExecOpts, path: &Path) -> Result<Deployment> {
    let mut deployment = Deployment::from_file(path)
        .with_context(|| format!("Failed to load deployment {}", path.display()))?;
    if let Some(user) = &opts.user {
        deployment.settings.user = user.clone();
    }
    Ok(deployment)
}

/// Build the ssh executor for a deployment.
pub fn executor(opts: &ExecOpts, deployment: &Deployment, log_cmds: bool) -> SshExecutor {
    let mut executor = SshExecutor::new()
        .with_user(deployment.settings.user.clone())
        .log_cmds(log_cmds);
    if let Some(secs) = opts.command_timeout {
        executor = executor.with_command_timeout(Duration::from_secs(secs));
    }
    executor
}
