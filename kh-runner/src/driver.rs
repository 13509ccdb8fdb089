//! Run driver.
//!
//! A suite run goes through these stages, stopping at the first error:
//!
//! 1. derive the southbound remotes from the `cluster` section
//! 2. allocate worker identities
//! 3. resolve and configure every test section
//! 4. bring the workers up
//! 5. run the tests in document order
//!
//! Stages 1 to 3 touch no remote host, so configuration and resource
//! errors surface before anything is changed.

use ovn_kh_core::{create_worker_nodes, AllocError, PhaseSink, WorkerNode};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ClusterCfg, ConfigError, TestDocument};
use crate::deployment::Deployment;
use crate::executor::RemoteExecutor;
use crate::provisioner::{BringupError, NodeProvisioner};
use crate::registry::{TestEnv, TestError, TestRegistry};

/// Run errors.
#[derive(Debug, Error)]
pub enum RunError {
    /// Invalid deployment or test document.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Worker identities or remotes could not be derived.
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// Worker bring-up failed.
    #[error(transparent)]
    Bringup(#[from] BringupError),

    /// A test failed.
    #[error("test {section} failed: {source}")]
    Test {
        /// Section the test was configured from.
        section: String,
        /// Underlying test error.
        #[source]
        source: TestError,
    },
}

/// Drives provisioning and test runs against one deployment.
#[derive(Clone)]
pub struct Orchestrator {
    executor: Arc<dyn RemoteExecutor>,
    phases: Arc<dyn PhaseSink>,
    parallelism: usize,
}

impl Orchestrator {
    /// Create an orchestrator with sequential bring-up.
    pub fn new(executor: Arc<dyn RemoteExecutor>, phases: Arc<dyn PhaseSink>) -> Self {
        Self {
            executor,
            phases,
            parallelism: 1,
        }
    }

    /// Bring up to `n` workers up at once.
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    fn provisioner(&self, cluster: &ClusterCfg) -> NodeProvisioner {
        NodeProvisioner::new(Arc::clone(&self.executor))
            .with_cluster_name(cluster.cluster_name.clone())
            .with_parallelism(self.parallelism)
    }

    fn allocate(
        deployment: &Deployment,
        cluster: &ClusterCfg,
        count: usize,
    ) -> Result<Vec<WorkerNode>, AllocError> {
        create_worker_nodes(
            &cluster.pool(),
            &deployment.workers,
            &deployment.central,
            &cluster.images(),
            count,
        )
    }

    /// Allocate `count` workers and bring them up.
    pub async fn provision(
        &self,
        deployment: &Deployment,
        cluster: &ClusterCfg,
        count: usize,
    ) -> Result<Vec<WorkerNode>, RunError> {
        let mut workers = Self::allocate(deployment, cluster, count)?;
        tracing::info!(
            workers = workers.len(),
            hosts = deployment.workers.len(),
            "provisioning workers"
        );
        self.provisioner(cluster)
            .bring_up(&mut workers, Arc::clone(&self.phases))
            .await?;
        Ok(workers)
    }

    /// Run every test in `doc` against a freshly provisioned cluster.
    ///
    /// Returns the provisioned workers.
    pub async fn run_suite(
        &self,
        deployment: &Deployment,
        doc: &TestDocument,
        registry: &TestRegistry,
    ) -> Result<Vec<WorkerNode>, RunError> {
        let cluster = doc.cluster();
        let remotes = cluster.node_remotes()?;
        tracing::info!(remotes = %remotes, "southbound remotes");

        let mut workers = Self::allocate(deployment, cluster, cluster.n_workers)?;
        let tests = registry.configure_tests(doc, &deployment.central, &workers)?;
        tracing::info!(
            tests = tests.len(),
            workers = workers.len(),
            "test suite configured"
        );

        self.provisioner(cluster)
            .bring_up(&mut workers, Arc::clone(&self.phases))
            .await?;

        let env = TestEnv {
            global: doc.global(),
            cluster,
            bringup: doc.bringup(),
            central: &deployment.central,
            workers: &workers,
            executor: self.executor.as_ref(),
            phases: Arc::clone(&self.phases),
        };
        for test in &tests {
            tracing::info!(test = test.name(), "running test");
            let result = test.run(&env).await;
            if doc.global().cleanup {
                if let Err(e) = test.cleanup(&env).await {
                    if result.is_ok() {
                        return Err(RunError::Test {
                            section: test.name().to_string(),
                            source: e,
                        });
                    }
                    tracing::warn!(test = test.name(), error = %e, "cleanup failed");
                }
            }
            result.map_err(|source| RunError::Test {
                section: test.name().to_string(),
                source,
            })?;
        }

        Ok(workers)
    }
}
