//! `node_ready`: wait for every worker to join the cluster as Ready.

use async_trait::async_trait;
use ovn_kh_core::{PhaseContext, PhysicalNode, WorkerNode};
use serde::Deserialize;

use crate::config::{ConfigError, TestDocument};
use crate::executor::CaptureSink;
use crate::registry::{ScaleTest, TestEnv, TestError};

/// The `node_ready` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeReadyCfg {
    /// How long each worker may take to report Ready.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for NodeReadyCfg {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Waits for every worker's Kubernetes node to become Ready.
#[derive(Debug, Clone)]
pub struct NodeReady {
    section: String,
    cfg: NodeReadyCfg,
}

impl NodeReady {
    /// Registry factory.
    pub fn from_document(
        doc: &TestDocument,
        section: &str,
        _central: &PhysicalNode,
        _workers: &[WorkerNode],
    ) -> Result<Box<dyn ScaleTest>, ConfigError> {
        Ok(Box::new(Self {
            section: section.to_string(),
            cfg: doc.section_as(section)?,
        }))
    }

    /// Parsed section.
    pub fn config(&self) -> &NodeReadyCfg {
        &self.cfg
    }

    fn wait_command(&self, worker: &WorkerNode) -> String {
        format!(
            "kubectl wait --for=condition=Ready node/{} --timeout={}s",
            worker.name(),
            self.cfg.timeout_secs
        )
    }
}

#[async_trait]
impl ScaleTest for NodeReady {
    fn name(&self) -> &str {
        &self.section
    }

    async fn run(&self, env: &TestEnv<'_>) -> Result<(), TestError> {
        let mut phase = PhaseContext::open(&self.section, env.workers.len(), env.phases.clone());
        for worker in env.workers {
            let mut sink = CaptureSink::new(env.central.hostname());
            env.executor
                .run(env.central, None, &self.wait_command(worker), &mut sink)
                .await?;
            phase.advance();
        }
        phase.complete();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterBringupCfg, ClusterCfg, GlobalCfg};
    use crate::executor::MockExecutor;
    use ovn_kh_core::{
        create_worker_nodes, ClusterImages, PhaseLog, PhaseOutcome, WorkerPool, DEFAULT_KIND_NET,
    };
    use std::path::Path;
    use std::sync::Arc;

    fn setup(n: usize) -> (PhysicalNode, Vec<WorkerNode>) {
        let central = PhysicalNode::new("ctrl", false);
        let hosts = vec![Arc::new(PhysicalNode::new("w0", true))];
        let pool = WorkerPool::new(DEFAULT_KIND_NET, Default::default());
        let workers =
            create_worker_nodes(&pool, &hosts, &central, &ClusterImages::default(), n).unwrap();
        (central, workers)
    }

    fn build(yaml: &str, central: &PhysicalNode, workers: &[WorkerNode]) -> Box<dyn ScaleTest> {
        let doc = TestDocument::from_yaml_str(yaml, Path::new("test.yml")).unwrap();
        NodeReady::from_document(&doc, "node_ready", central, workers)
            .ok()
            .unwrap()
    }

    #[tokio::test]
    async fn waits_for_each_worker_on_central() {
        let (central, workers) = setup(2);
        let test = build("node_ready:\n  timeout_secs: 60\n", &central, &workers);
        let mock = MockExecutor::new();
        let log = PhaseLog::new();
        let env = TestEnv {
            global: &GlobalCfg::default(),
            cluster: &ClusterCfg::default(),
            bringup: &ClusterBringupCfg::default(),
            central: &central,
            workers: &workers,
            executor: &mock,
            phases: Arc::new(log.clone()),
        };

        test.run(&env).await.unwrap();

        let calls = mock.calls();
        assert!(calls.iter().all(|c| c.host == "ctrl"));
        assert_eq!(
            mock.commands(),
            vec![
                "kubectl wait --for=condition=Ready node/ovn-worker3 --timeout=60s",
                "kubectl wait --for=condition=Ready node/ovn-worker4 --timeout=60s",
            ]
        );
        let records = log.records();
        assert_eq!(records[0].name, "node_ready");
        assert_eq!(records[0].outcome, PhaseOutcome::Completed);
        assert_eq!(records[0].completed, 2);
    }

    #[tokio::test]
    async fn failure_is_recorded_and_propagated() {
        let (central, workers) = setup(3);
        let test = build("node_ready: {}\n", &central, &workers);
        let mock = MockExecutor::new();
        mock.fail_on("node/ovn-worker4", "timed out waiting for the condition");
        let log = PhaseLog::new();
        let env = TestEnv {
            global: &GlobalCfg::default(),
            cluster: &ClusterCfg::default(),
            bringup: &ClusterBringupCfg::default(),
            central: &central,
            workers: &workers,
            executor: &mock,
            phases: Arc::new(log.clone()),
        };

        let err = test.run(&env).await.unwrap_err();
        assert!(err.to_string().contains("timed out waiting"));
        assert_eq!(mock.commands().len(), 2);
        assert!(mock.commands()[0].ends_with("--timeout=300s"));
        let records = log.records();
        assert_eq!(records[0].outcome, PhaseOutcome::Failed);
        assert_eq!(records[0].completed, 1);
    }
}
