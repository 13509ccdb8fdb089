//! Run a test document.

use anyhow::{Context, Result};
use ovn_kh_core::PhaseLog;
use ovn_kh_runner::{Orchestrator, TestDocument, TestRegistry};
use std::path::Path;
use std::sync::Arc;

use super::{executor, load_deployment};
use crate::ExecOpts;

/// Run the run command.
pub async fn run(opts: &ExecOpts, deployment: &Path, test_conf: &Path) -> Result<()> {
    let deployment = load_deployment(opts, deployment)?;
    let doc = TestDocument::from_file(test_conf)
        .with_context(|| format!("Failed to load test document {}", test_conf.display()))?;

    let log = PhaseLog::new();
    let log_cmds = opts.log_cmds || doc.global().log_cmds;
    let orchestrator = Orchestrator::new(
        Arc::new(executor(opts, &deployment, log_cmds)),
        Arc::new(log.clone()),
    )
    .with_parallelism(usize::from(opts.parallel));

    let result = orchestrator
        .run_suite(&deployment, &doc, &TestRegistry::builtin())
        .await;
    print!("{}", log.summary());

    result.context("Test run failed")?;
    Ok(())
}
