//! # ovn-kh-core
//!
//! Pure logic for ovn-kind-heater (no I/O, instant tests).
//!
//! - [`WorkerPool`], [`node_remotes`] - deterministic worker identities and
//!   control-plane remotes
//! - [`PhysicalNode`], [`WorkerNode`] - the cluster data model
//! - [`PhaseContext`] - scoped timing for orchestration phases
//!
//! Remote command execution lives in `ovn-kh-runner`, which drives these
//! types.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addr;
pub mod allocator;
mod error;
pub mod node;
pub mod phase;

pub use addr::{Ipv4Net, MacAddr};
pub use allocator::{
    central_nb_remote, container_name, create_worker_nodes, node_remotes, MacEncoding,
    RemoteTopology, WorkerIdentity, WorkerPool, DEFAULT_KIND_NET, DEFAULT_NODE_NET,
};
pub use error::AllocError;
pub use node::{ClusterImages, PhysicalNode, WorkerNode};
pub use phase::{PhaseContext, PhaseLog, PhaseOutcome, PhaseRecord, PhaseSink};
