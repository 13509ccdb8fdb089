//! Deterministic worker identities and control-plane remotes.
//!
//! Everything here is a pure function of its inputs: the same ordinal and
//! pool always yield the same container name, IP and MAC, and the same
//! topology always yields the same remote list.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::addr::{Ipv4Net, MacAddr};
use crate::error::AllocError;
use crate::node::{ClusterImages, PhysicalNode, WorkerNode};

/// Addresses at the start of the kind pool kept for infrastructure.
pub const RESERVED_INFRA_ADDRS: u64 = 6;

/// Fixed high-order bytes of every worker MAC.
pub const WORKER_MAC_PREFIX: [u8; 4] = [0xae, 0x01, 0x00, 0x00];

/// Offset added to the ordinal before it is encoded into the MAC.
const MAC_COUNTER_OFFSET: usize = 5;

/// Workers are named from `ovn-worker3` upward; lower numbers belong to the
/// base kind cluster.
const WORKER_NAME_OFFSET: usize = 3;

/// Default kind network workers are addressed from.
pub const DEFAULT_KIND_NET: Ipv4Net = Ipv4Net::from_octets([10, 82, 0, 0], 16);

/// Default control-plane network database remotes are taken from.
pub const DEFAULT_NODE_NET: Ipv4Net = Ipv4Net::from_octets([192, 16, 0, 0], 16);

/// Southbound database port clients connect to.
pub const SB_PORT: u16 = 6642;

/// Northbound database port on the central node.
pub const NB_PORT: u16 = 6641;

/// How the low two bytes of a worker MAC are derived from `ordinal + 5`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacEncoding {
    /// Big-endian 16-bit counter.
    #[default]
    Counter,
    /// `(n / 255, n % 255)`: matches MACs already assigned by existing
    /// deployments. Never produces `ff` in the last byte.
    Legacy,
}

impl MacEncoding {
    /// Largest counter value (`ordinal + 5`) this encoding can represent.
    fn max_counter(self) -> usize {
        match self {
            MacEncoding::Counter => 0xffff,
            MacEncoding::Legacy => 255 * 255 + 254,
        }
    }

    /// Encode the MAC for `ordinal`, or `None` once the two low bytes overflow.
    pub fn encode(self, ordinal: usize) -> Option<MacAddr> {
        let n = ordinal.checked_add(MAC_COUNTER_OFFSET)?;
        if n > self.max_counter() {
            return None;
        }
        let (hi, lo) = match self {
            MacEncoding::Counter => (n >> 8, n & 0xff),
            MacEncoding::Legacy => (n / 255, n % 255),
        };
        let [a, b, c, d] = WORKER_MAC_PREFIX;
        Some(MacAddr::new([a, b, c, d, hi as u8, lo as u8]))
    }

    /// Number of ordinals this encoding can represent.
    pub fn capacity(self) -> usize {
        self.max_counter() - MAC_COUNTER_OFFSET + 1
    }
}

/// Container name for the worker with the given ordinal.
pub fn container_name(ordinal: usize) -> String {
    // u128 holds every usize ordinal plus the offset
    format!("ovn-worker{}", ordinal as u128 + WORKER_NAME_OFFSET as u128)
}

/// Northbound database remote served by the central node.
pub fn central_nb_remote(central: &PhysicalNode) -> String {
    format!("tcp:{}:{}", central.hostname(), NB_PORT)
}

/// Network identity assigned to one worker ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    /// Zero-based ordinal.
    pub ordinal: usize,
    /// Container name.
    pub name: String,
    /// Assigned IP address.
    pub ip: Ipv4Addr,
    /// Assigned hardware address.
    pub mac: MacAddr,
}

/// The address pool worker identities are carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    network: Ipv4Net,
    encoding: MacEncoding,
}

impl WorkerPool {
    /// Create a pool over `network` using the given MAC encoding.
    pub fn new(network: Ipv4Net, encoding: MacEncoding) -> Self {
        Self { network, encoding }
    }

    /// The pool network.
    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    /// The MAC encoding.
    pub fn encoding(&self) -> MacEncoding {
        self.encoding
    }

    /// Maximum number of workers: bounded by the usable addresses after the
    /// reserved block and by what the MAC encoding can represent.
    pub fn capacity(&self) -> usize {
        let first = u64::from(u32::from(self.network.network())) + RESERVED_INFRA_ADDRS;
        let last = u64::from(u32::from(self.network.last_host()));
        let by_ip = if last >= first { last - first + 1 } else { 0 };
        usize::try_from(by_ip)
            .unwrap_or(usize::MAX)
            .min(self.encoding.capacity())
    }

    /// `ip(i) = base + 6 + i`.
    pub fn ip(&self, ordinal: usize) -> Option<Ipv4Addr> {
        let offset = u64::try_from(ordinal)
            .ok()?
            .checked_add(RESERVED_INFRA_ADDRS)?;
        self.network.host_at_offset(offset)
    }

    /// Hardware address for `ordinal`.
    pub fn mac(&self, ordinal: usize) -> Option<MacAddr> {
        self.encoding.encode(ordinal)
    }

    /// Full identity for one ordinal.
    pub fn identity(&self, ordinal: usize) -> Result<WorkerIdentity, AllocError> {
        let exhausted = || AllocError::PoolExhausted {
            network: self.network.to_string(),
            requested: ordinal.saturating_add(1),
            capacity: self.capacity(),
        };
        Ok(WorkerIdentity {
            ordinal,
            name: container_name(ordinal),
            ip: self.ip(ordinal).ok_or_else(exhausted)?,
            mac: self.mac(ordinal).ok_or_else(exhausted)?,
        })
    }

    /// Identities for ordinals `0..count`; fails up front if the pool is too
    /// small.
    pub fn allocate(&self, count: usize) -> Result<Vec<WorkerIdentity>, AllocError> {
        let capacity = self.capacity();
        if count > capacity {
            return Err(AllocError::PoolExhausted {
                network: self.network.to_string(),
                requested: count,
                capacity,
            });
        }
        (0..count).map(|i| self.identity(i)).collect()
    }
}

/// Build `count` worker nodes, spread round-robin over `hosts`.
pub fn create_worker_nodes(
    pool: &WorkerPool,
    hosts: &[Arc<PhysicalNode>],
    central: &PhysicalNode,
    images: &ClusterImages,
    count: usize,
) -> Result<Vec<WorkerNode>, AllocError> {
    if count > 0 && hosts.is_empty() {
        return Err(AllocError::NoWorkerHosts);
    }
    let nb_remote = central_nb_remote(central);
    let identities = pool.allocate(count)?;
    Ok(identities
        .into_iter()
        .map(|id| {
            let host = Arc::clone(&hosts[id.ordinal % hosts.len()]);
            WorkerNode::new(
                host,
                id.ordinal,
                id.name,
                id.ip,
                id.mac,
                nb_remote.clone(),
                images.clone(),
            )
        })
        .collect())
}

/// Control-plane topology used to derive node remotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteTopology {
    /// Three database replicas instead of one.
    pub clustered: bool,
    /// Number of relays; 0 means clients talk to the replicas directly.
    pub n_relays: usize,
    /// Use `ssl:` instead of `tcp:`.
    pub enable_ssl: bool,
}

impl RemoteTopology {
    /// Number of control-plane replicas.
    pub fn replicas(&self) -> usize {
        if self.clustered {
            3
        } else {
            1
        }
    }
}

/// Comma-joined `scheme:ip:6642` remotes a node should connect to.
///
/// Host addresses of `net` are taken in order. The first `replicas`
/// addresses are the database replicas; relays, when present, follow them.
pub fn node_remotes(net: &Ipv4Net, topology: &RemoteTopology) -> Result<String, AllocError> {
    let replicas = topology.replicas();
    let (skip, take) = if topology.n_relays > 0 {
        (replicas, topology.n_relays)
    } else {
        (0, replicas)
    };

    let available = usize::try_from(net.host_count()).unwrap_or(usize::MAX);
    if skip.checked_add(take).filter(|&n| n <= available).is_none() {
        if topology.n_relays > 0 {
            return Err(AllocError::RelayCountOutOfRange {
                network: net.to_string(),
                requested: topology.n_relays,
                available: available.saturating_sub(replicas),
            });
        }
        return Err(AllocError::InvalidNetwork(format!(
            "{}: too small for {} control-plane replicas",
            net, replicas
        )));
    }

    let scheme = if topology.enable_ssl { "ssl" } else { "tcp" };
    let remotes: Vec<String> = net
        .hosts()
        .skip(skip)
        .take(take)
        .map(|ip| format!("{}:{}:{}", scheme, ip, SB_PORT))
        .collect();
    Ok(remotes.join(","))
}
