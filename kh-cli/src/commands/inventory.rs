//! Print the Ansible inventory.

use anyhow::{Context, Result};
use ovn_kh_runner::{Inventory, SystemResolver};
use std::path::Path;

use super::load_deployment;
use crate::ExecOpts;

/// Run the inventory command.
pub fn run(opts: &ExecOpts, deployment: &Path, rundir: &str) -> Result<()> {
    let deployment = load_deployment(opts, deployment)?;
    let inventory = Inventory::build(&deployment, rundir, &SystemResolver)
        .context("Failed to build inventory")?;
    print!("{}", inventory);
    Ok(())
}
