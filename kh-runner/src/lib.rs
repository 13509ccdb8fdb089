//! # ovn-kh-runner
//!
//! Everything in ovn-kind-heater that talks to the outside world.
//!
//! ## Features
//!
//! - **Remote Execution**: [`RemoteExecutor`] trait, `ssh` implementation, mock
//! - **Bring-up**: [`NodeProvisioner`] joins workers to the overlay and kind
//! - **Tests**: [`TestRegistry`] maps document sections to [`ScaleTest`]s
//! - **Inventory**: Ansible inventory for a deployment
//!
//! ## Example
//!
//! ```ignore
//! use ovn_kh_runner::{Deployment, Orchestrator, SshExecutor, TestDocument, TestRegistry};
//!
//! let deployment = Deployment::from_file(Path::new("deployment.yml"))?;
//! let doc = TestDocument::from_file(Path::new("density.yml"))?;
//! let log = PhaseLog::new();
//!
//! let orchestrator = Orchestrator::new(Arc::new(SshExecutor::new()), Arc::new(log.clone()));
//! orchestrator.run_suite(&deployment, &doc, &TestRegistry::builtin()).await?;
//! println!("{}", log.summary());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod deployment;
pub mod driver;
pub mod executor;
pub mod inventory;
pub mod provisioner;
pub mod registry;
pub mod scale_tests;

pub use config::{ClusterBringupCfg, ClusterCfg, ConfigError, GlobalCfg, TestDocument};
pub use deployment::{Deployment, DeploymentSettings};
pub use driver::{Orchestrator, RunError};
pub use executor::{
    CaptureSink, ExecError, MockExecutor, OutputSink, RecordedCall, RemoteExecutor, SshExecutor,
};
pub use inventory::{Inventory, InventoryError, Resolver, SystemResolver};
pub use provisioner::{
    BringupError, NodeProvisioner, ProvisionError, ProvisionStep, BRINGUP_PHASE,
};
pub use registry::{canonical_type_name, ScaleTest, TestEnv, TestError, TestFactory, TestRegistry};
