//! # ovn-kh-tester
//!
//! Brings up kind workers on an OVN control plane and runs scale tests
//! against them.
//!
//! ## Commands
//!
//! - `provision`: Allocate and bring up workers
//! - `run`: Bring up the cluster a test document describes and run its tests
//! - `inventory`: Print the Ansible inventory for a deployment
//!
//! ## Example
//!
//! ```bash
//! # Four workers with default cluster settings
//! ovn-kh-tester provision deployment.yml 4
//!
//! # Full run, two workers at a time
//! ovn-kh-tester --parallel 2 run deployment.yml density.yml
//!
//! # Inventory for the ansible playbooks
//! ovn-kh-tester inventory deployment.yml /tmp/run > hosts
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{inventory, provision, run};

/// OVN kind scale-test driver.
#[derive(Parser, Debug)]
#[command(name = "ovn-kh-tester")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    exec: ExecOpts,

    #[command(subcommand)]
    command: Commands,
}

/// Options for the remote executor.
#[derive(Args, Debug, Clone)]
pub struct ExecOpts {
    /// Remote user for ssh (defaults to the deployment's `user`)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Number of workers brought up at once
    #[arg(
        long,
        global = true,
        default_value = "1",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub parallel: u16,

    /// Log every remote command at info level
    #[arg(long, global = true)]
    pub log_cmds: bool,

    /// Kill remote commands running longer than this many seconds
    #[arg(long, global = true)]
    pub command_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Allocate and bring up workers with default cluster settings
    Provision {
        /// Deployment description (YAML)
        deployment: PathBuf,

        /// Number of workers
        worker_count: usize,
    },

    /// Bring up a cluster and run the tests of a test document
    Run {
        /// Deployment description (YAML)
        deployment: PathBuf,

        /// Test configuration document (YAML)
        test_conf: PathBuf,
    },

    /// Print the Ansible inventory for a deployment
    Inventory {
        /// Deployment description (YAML)
        deployment: PathBuf,

        /// Run directory written into the inventory vars
        rundir: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout and succeed
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_tracing();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Provision {
            deployment,
            worker_count,
        } => provision::run(&cli.exec, &deployment, worker_count).await,
        Commands::Run {
            deployment,
            test_conf,
        } => run::run(&cli.exec, &deployment, &test_conf).await,
        Commands::Inventory { deployment, rundir } => {
            inventory::run(&cli.exec, &deployment, &rundir)
        }
    }
}
