//! Bring up workers.

use anyhow::{Context, Result};
use ovn_kh_core::PhaseLog;
use ovn_kh_runner::{ClusterCfg, Orchestrator};
use std::path::Path;
use std::sync::Arc;

use super::{executor, load_deployment};
use crate::ExecOpts;

/// Run the provision command.
pub async fn run(opts: &ExecOpts, deployment: &Path, worker_count: usize) -> Result<()> {
    let deployment = load_deployment(opts, deployment)?;
    let log = PhaseLog::new();
    let orchestrator = Orchestrator::new(
        Arc::new(executor(opts, &deployment, opts.log_cmds)),
        Arc::new(log.clone()),
    )
    .with_parallelism(usize::from(opts.parallel));

    let result = orchestrator
        .provision(&deployment, &ClusterCfg::default(), worker_count)
        .await;
    print!("{}", log.summary());

    let workers = result.context("Provisioning failed")?;
    for worker in &workers {
        println!("{}", worker);
    }
    Ok(())
}
