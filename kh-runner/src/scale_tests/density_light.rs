//! `density_light`: a fixed number of pause pods pinned to each worker.

use async_trait::async_trait;
use ovn_kh_core::{PhaseContext, PhysicalNode, WorkerNode};
use serde::Deserialize;

use crate::config::{ConfigError, TestDocument};
use crate::executor::CaptureSink;
use crate::registry::{ScaleTest, TestEnv, TestError};

/// The `density_light` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DensityLightCfg {
    /// Pods per worker; falls back to `base_cluster_bringup.n_pods_per_node`.
    #[serde(default)]
    pub n_pods_per_node: Option<usize>,
    /// Pod image.
    #[serde(default = "default_image")]
    pub image: String,
    /// Namespace the pods are created in.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_image() -> String {
    "registry.k8s.io/pause:3.9".to_string()
}

fn default_namespace() -> String {
    "density-light".to_string()
}

impl Default for DensityLightCfg {
    fn default() -> Self {
        Self {
            n_pods_per_node: None,
            image: default_image(),
            namespace: default_namespace(),
        }
    }
}

/// Starts pause pods pinned to every worker and checks they are running.
#[derive(Debug, Clone)]
pub struct DensityLight {
    section: String,
    cfg: DensityLightCfg,
    pods_per_node: usize,
}

impl DensityLight {
    /// Registry factory.
    pub fn from_document(
        doc: &TestDocument,
        section: &str,
        _central: &PhysicalNode,
        _workers: &[WorkerNode],
    ) -> Result<Box<dyn ScaleTest>, ConfigError> {
        Ok(Box::new(Self::configure(doc, section)?))
    }

    fn configure(doc: &TestDocument, section: &str) -> Result<Self, ConfigError> {
        let cfg: DensityLightCfg = doc.section_as(section)?;
        let pods_per_node = cfg
            .n_pods_per_node
            .unwrap_or(doc.bringup().n_pods_per_node);
        Ok(Self {
            section: section.to_string(),
            cfg,
            pods_per_node,
        })
    }

    /// Pods started on each worker.
    pub fn pods_per_node(&self) -> usize {
        self.pods_per_node
    }

    fn pod_command(&self, worker: &WorkerNode, index: usize) -> String {
        format!(
            "kubectl run {}-{} -n {} --image={} --restart=Never --overrides='{{\"spec\":{{\"nodeName\":\"{}\"}}}}'",
            worker.name(),
            index,
            self.cfg.namespace,
            self.cfg.image,
            worker.name()
        )
    }

    fn count_command(&self) -> String {
        format!(
            "kubectl get pods -n {} --field-selector=status.phase=Running --no-headers | wc -l",
            self.cfg.namespace
        )
    }
}

#[async_trait]
impl ScaleTest for DensityLight {
    fn name(&self) -> &str {
        &self.section
    }

    async fn run(&self, env: &TestEnv<'_>) -> Result<(), TestError> {
        let expected = self.pods_per_node * env.workers.len();
        let mut phase = PhaseContext::open(&self.section, expected, env.phases.clone());
        let mut sink = CaptureSink::new(env.central.hostname());

        let create_ns = format!(
            "kubectl create namespace {} --dry-run=client -o yaml | kubectl apply -f -",
            self.cfg.namespace
        );
        env.executor
            .run(env.central, None, &create_ns, &mut sink)
            .await?;

        for worker in env.workers {
            let mut node_phase =
                phase.child(format!("{}/{}", self.section, worker.name()), self.pods_per_node);
            for i in 0..self.pods_per_node {
                env.executor
                    .run(env.central, None, &self.pod_command(worker, i), &mut sink)
                    .await?;
                node_phase.advance();
            }
            node_phase.complete();
            phase.advance_by(self.pods_per_node);
        }

        let mut count_sink = CaptureSink::new(env.central.hostname());
        env.executor
            .run(env.central, None, &self.count_command(), &mut count_sink)
            .await?;
        let running = count_sink
            .last_line()
            .and_then(|line| line.parse::<usize>().ok())
            .ok_or_else(|| TestError::Failed(format!("{}: no pod count reported", self.section)))?;
        if running < expected {
            return Err(TestError::Failed(format!(
                "{}: {} of {} pods running",
                self.section, running, expected
            )));
        }

        phase.complete();
        Ok(())
    }

    async fn cleanup(&self, env: &TestEnv<'_>) -> Result<(), TestError> {
        let cmd = format!(
            "kubectl delete namespace {} --ignore-not-found",
            self.cfg.namespace
        );
        let mut sink = CaptureSink::new(env.central.hostname());
        env.executor.run(env.central, None, &cmd, &mut sink).await?;
        Ok(())
    }
}
