//! Worker bring-up.
//!
//! Joining a worker takes three commands on its physical host, always in
//! this order:
//!
//! 1. register the worker's logical switch port on the northbound database
//! 2. create the kind node container and join it to the cluster
//! 3. load the workload image into the new node
//!
//! A failing step stops that worker; nothing is rolled back.

use futures_util::stream::{self, StreamExt};
use ovn_kh_core::{PhaseContext, PhaseSink, WorkerNode};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::executor::{CaptureSink, ExecError, RemoteExecutor};

/// Name of the bring-up phase.
pub const BRINGUP_PHASE: &str = "base_cluster_bringup";

/// Logical switch worker ports are attached to.
const KIND_SWITCH: &str = "kind";

/// One of the three bring-up steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    /// `ovn-nbctl lsp-add` + `lsp-set-addresses`.
    RegisterPort,
    /// `kind create cluster --join`.
    JoinCluster,
    /// `kind load docker-image`.
    LoadImage,
}

impl ProvisionStep {
    /// All steps, in execution order.
    pub const ALL: [ProvisionStep; 3] = [
        ProvisionStep::RegisterPort,
        ProvisionStep::JoinCluster,
        ProvisionStep::LoadImage,
    ];

    /// Short label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::RegisterPort => "register-port",
            ProvisionStep::JoinCluster => "join-cluster",
            ProvisionStep::LoadImage => "load-image",
        }
    }

    /// The command this step runs for `worker`.
    pub fn command(&self, worker: &WorkerNode, cluster_name: &str) -> String {
        match self {
            ProvisionStep::RegisterPort => format!(
                "ovn-nbctl --db={} lsp-add {} {} -- lsp-set-addresses {} \"{} {}\"",
                worker.nb_remote(),
                KIND_SWITCH,
                worker.name(),
                worker.name(),
                worker.mac(),
                worker.ip()
            ),
            ProvisionStep::JoinCluster => format!(
                "kind create cluster --name {} --image {} --join --nodeip={} --nodemac={} --nodename={}",
                cluster_name,
                worker.image_id(),
                worker.ip(),
                worker.mac(),
                worker.name()
            ),
            ProvisionStep::LoadImage => format!(
                "kind load docker-image {} --name {} --nodes {}",
                worker.workload_image_id(),
                cluster_name,
                worker.name()
            ),
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bring-up step failed for one worker.
#[derive(Debug, Error)]
#[error("worker {worker} on {host}: step {step} failed: {source}")]
pub struct ProvisionError {
    /// Worker container name.
    pub worker: String,
    /// Worker ordinal.
    pub ordinal: usize,
    /// Physical host.
    pub host: String,
    /// The failing step; later steps were not attempted.
    pub step: ProvisionStep,
    /// Underlying execution error.
    #[source]
    pub source: ExecError,
}

/// Bring-up errors.
#[derive(Debug, Error)]
pub enum BringupError {
    /// Sequential bring-up stopped at this worker.
    #[error(transparent)]
    Worker(#[from] ProvisionError),

    /// Parallel bring-up finished with these failures, ordered by ordinal.
    #[error("{} of {total} workers failed to provision: {}", .failures.len(), summarize(.failures))]
    Workers {
        /// Every failed worker.
        failures: Vec<ProvisionError>,
        /// Number of workers attempted.
        total: usize,
    },
}

fn summarize(failures: &[ProvisionError]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.worker, f.step))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs the bring-up steps through a [`RemoteExecutor`].
#[derive(Clone)]
pub struct NodeProvisioner {
    executor: Arc<dyn RemoteExecutor>,
    cluster_name: String,
    parallelism: usize,
}

impl NodeProvisioner {
    /// Create a sequential provisioner for the `ovn` kind cluster.
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            cluster_name: "ovn".to_string(),
            parallelism: 1,
        }
    }

    /// Join workers to the named kind cluster.
    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    /// Bring up to `n` workers up at once. 0 and 1 both mean sequential.
    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Run the three bring-up steps for one worker.
    ///
    /// The last output line seen is stored on the worker, including when a
    /// step fails.
    pub async fn configure(&self, worker: &mut WorkerNode) -> Result<(), ProvisionError> {
        let mut sink = CaptureSink::new(worker.name());
        for step in ProvisionStep::ALL {
            let cmd = step.command(worker, &self.cluster_name);
            tracing::debug!(worker = worker.name(), step = %step, "running bring-up step");

            let result = self
                .executor
                .run(worker.host(), None, &cmd, &mut sink)
                .await;
            worker.set_last_output(sink.last_line().map(str::to_string));

            result.map_err(|source| ProvisionError {
                worker: worker.name().to_string(),
                ordinal: worker.ordinal(),
                host: worker.host().hostname().to_string(),
                step,
                source,
            })?;
        }
        tracing::info!(worker = %worker, "worker configured");
        Ok(())
    }

    /// Bring up every worker inside one [`BRINGUP_PHASE`] phase.
    pub async fn bring_up(
        &self,
        workers: &mut [WorkerNode],
        phases: Arc<dyn PhaseSink>,
    ) -> Result<(), BringupError> {
        let mut phase = PhaseContext::open(BRINGUP_PHASE, workers.len(), phases);
        let result = if self.parallelism > 1 {
            self.bring_up_parallel(workers, &mut phase).await
        } else {
            self.bring_up_sequential(workers, &mut phase).await
        };
        phase.finish(result)
    }

    async fn bring_up_sequential(
        &self,
        workers: &mut [WorkerNode],
        phase: &mut PhaseContext,
    ) -> Result<(), BringupError> {
        for worker in workers.iter_mut() {
            self.configure(worker).await?;
            phase.advance();
        }
        Ok(())
    }

    async fn bring_up_parallel(
        &self,
        workers: &mut [WorkerNode],
        phase: &mut PhaseContext,
    ) -> Result<(), BringupError> {
        let total = workers.len();
        let results: Vec<Result<(), ProvisionError>> = stream::iter(workers.iter_mut())
            .map(|worker| self.configure(worker))
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(()) => phase.advance(),
                Err(e) => failures.push(e),
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        failures.sort_by_key(|f| f.ordinal);
        Err(BringupError::Workers { failures, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use ovn_kh_core::{
        create_worker_nodes, ClusterImages, PhaseLog, PhaseOutcome, PhysicalNode, WorkerPool,
        DEFAULT_KIND_NET,
    };

    fn workers(n: usize) -> Vec<WorkerNode> {
        let hosts = vec![
            Arc::new(PhysicalNode::new("w0", true)),
            Arc::new(PhysicalNode::new("w1", true)),
        ];
        let central = PhysicalNode::new("ctrl", false);
        let pool = WorkerPool::new(DEFAULT_KIND_NET, Default::default());
        create_worker_nodes(&pool, &hosts, &central, &ClusterImages::default(), n).unwrap()
    }

    fn provisioner(mock: &MockExecutor) -> NodeProvisioner {
        NodeProvisioner::new(Arc::new(mock.clone()))
    }

    #[test]
    fn step_commands_for_first_worker() {
        let w = &workers(1)[0];
        assert_eq!(
            ProvisionStep::RegisterPort.command(w, "ovn"),
            "ovn-nbctl --db=tcp:ctrl:6641 lsp-add kind ovn-worker3 -- lsp-set-addresses ovn-worker3 \"ae:01:00:00:00:05 10.82.0.6\""
        );
        assert_eq!(
            ProvisionStep::JoinCluster.command(w, "ovn"),
            "kind create cluster --name ovn --image kindest/node:v1.20.0 --join --nodeip=10.82.0.6 --nodemac=ae:01:00:00:00:05 --nodename=ovn-worker3"
        );
        assert_eq!(
            ProvisionStep::LoadImage.command(w, "ovn"),
            "kind load docker-image localhost/ovn-daemonset-f:dev --name ovn --nodes ovn-worker3"
        );
    }

    #[tokio::test]
    async fn configure_runs_three_steps_on_the_worker_host() {
        let mock = MockExecutor::new();
        mock.respond("kind load", &["Image: \"localhost/ovn-daemonset-f:dev\" loaded"]);
        let mut ws = workers(2);

        provisioner(&mock).configure(&mut ws[1]).await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.host == "w1" && c.container.is_none()));
        assert!(calls[0].cmd.starts_with("ovn-nbctl"));
        assert!(calls[1].cmd.starts_with("kind create cluster"));
        assert!(calls[2].cmd.starts_with("kind load docker-image"));
        assert_eq!(
            ws[1].last_output(),
            Some("Image: \"localhost/ovn-daemonset-f:dev\" loaded")
        );
    }

    #[tokio::test]
    async fn failure_at_step_two_skips_step_three() {
        let mock = MockExecutor::new();
        mock.respond("kind create", &["ERROR: failed to join"]);
        mock.fail_on("kind create", "exit status 1");
        let mut ws = workers(1);

        let err = provisioner(&mock).configure(&mut ws[0]).await.unwrap_err();
        assert_eq!(err.step, ProvisionStep::JoinCluster);
        assert_eq!(err.worker, "ovn-worker3");
        assert_eq!(err.host, "w0");
        assert_eq!(mock.commands().len(), 2);
        assert!(!mock.commands().iter().any(|c| c.contains("kind load")));
        assert_eq!(ws[0].last_output(), Some("ERROR: failed to join"));
    }

    #[tokio::test]
    async fn failed_bring_up_still_closes_the_phase() {
        let mock = MockExecutor::new();
        mock.fail_on("--nodename=ovn-worker4", "boom");
        let log = PhaseLog::new();
        let mut ws = workers(3);

        let err = provisioner(&mock)
            .bring_up(&mut ws, Arc::new(log.clone()))
            .await
            .unwrap_err();
        match err {
            BringupError::Worker(e) => {
                assert_eq!(e.worker, "ovn-worker4");
                assert_eq!(e.step, ProvisionStep::JoinCluster);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // worker 3 fully, worker 4 up to the failing step, worker 5 never
        assert_eq!(mock.commands().len(), 5);
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, BRINGUP_PHASE);
        assert_eq!(records[0].outcome, PhaseOutcome::Failed);
        assert_eq!(records[0].units, 3);
        assert_eq!(records[0].completed, 1);
    }

    #[tokio::test]
    async fn sequential_bring_up_runs_in_list_order() {
        let mock = MockExecutor::new();
        let log = PhaseLog::new();
        let mut ws = workers(4);

        provisioner(&mock)
            .bring_up(&mut ws, Arc::new(log.clone()))
            .await
            .unwrap();

        let commands = mock.commands();
        assert_eq!(commands.len(), 12);
        for (i, chunk) in commands.chunks(3).enumerate() {
            let name = format!("ovn-worker{}", i + 3);
            assert!(chunk.iter().all(|c| c.contains(&name)), "{:?}", chunk);
        }
        let records = log.records();
        assert_eq!(records[0].outcome, PhaseOutcome::Completed);
        assert_eq!(records[0].completed, 4);
    }

    #[tokio::test]
    async fn parallel_bring_up_aggregates_failures() {
        let mock = MockExecutor::new();
        mock.fail_on("lsp-add kind ovn-worker6", "port exists");
        mock.fail_on("--nodes ovn-worker4", "image missing");
        let log = PhaseLog::new();
        let mut ws = workers(5);

        let err = provisioner(&mock)
            .with_parallelism(3)
            .bring_up(&mut ws, Arc::new(log.clone()))
            .await
            .unwrap_err();

        match &err {
            BringupError::Workers { failures, total } => {
                assert_eq!(*total, 5);
                let failed: Vec<_> = failures.iter().map(|f| (f.worker.as_str(), f.step)).collect();
                assert_eq!(
                    failed,
                    vec![
                        ("ovn-worker4", ProvisionStep::LoadImage),
                        ("ovn-worker6", ProvisionStep::RegisterPort),
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("2 of 5 workers failed to provision"));

        // 3 healthy workers * 3 + worker4 (3 steps) + worker6 (1 step)
        assert_eq!(mock.commands().len(), 13);
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, PhaseOutcome::Failed);
        assert_eq!(records[0].completed, 3);
    }

    #[tokio::test]
    async fn per_worker_steps_stay_ordered_in_parallel() {
        let mock = MockExecutor::new();
        let mut ws = workers(6);

        provisioner(&mock)
            .with_parallelism(4)
            .bring_up(&mut ws, Arc::new(PhaseLog::new()))
            .await
            .unwrap();

        for w in &ws {
            let mine: Vec<_> = mock
                .commands()
                .into_iter()
                .filter(|c| c.contains(&format!("{} ", w.name())) || c.ends_with(w.name()))
                .collect();
            assert_eq!(mine.len(), 3, "{}: {:?}", w.name(), mine);
            assert!(mine[0].starts_with("ovn-nbctl"));
            assert!(mine[1].starts_with("kind create"));
            assert!(mine[2].starts_with("kind load"));
        }
    }
}
