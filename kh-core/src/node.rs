//! Physical hosts and the kind worker nodes placed on them.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::addr::MacAddr;

/// Default kind node image.
pub const DEFAULT_BASE_IMAGE: &str = "kindest/node:v1.20.0";

/// Default ovn-kubernetes workload image loaded into every node.
pub const DEFAULT_WORKLOAD_IMAGE: &str = "localhost/ovn-daemonset-f:dev";

/// A physical machine from the deployment description.
///
/// Immutable once constructed; shared between the deployment and every
/// [`WorkerNode`] placed on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalNode {
    hostname: String,
    clustered: bool,
    internal_iface: Option<String>,
}

impl PhysicalNode {
    /// Create a node. `clustered` marks a container host that runs kind nodes.
    pub fn new(hostname: impl Into<String>, clustered: bool) -> Self {
        Self {
            hostname: hostname.into(),
            clustered,
            internal_iface: None,
        }
    }

    /// Set the per-host internal interface override.
    pub fn with_internal_iface(mut self, iface: impl Into<String>) -> Self {
        self.internal_iface = Some(iface.into());
        self
    }

    /// Host name used for remote access.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Whether this host runs kind node containers.
    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    /// Per-host internal interface override, if any.
    pub fn internal_iface(&self) -> Option<&str> {
        self.internal_iface.as_deref()
    }

    /// Whether commands for this host run on the local machine.
    pub fn is_local(&self) -> bool {
        self.hostname == "localhost"
    }
}

impl fmt::Display for PhysicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hostname)
    }
}

/// Container images used when bringing up a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterImages {
    /// Kind node image the worker container is created from.
    pub base: String,
    /// Workload image loaded into the running node.
    pub workload: String,
}

impl Default for ClusterImages {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_IMAGE.to_string(),
            workload: DEFAULT_WORKLOAD_IMAGE.to_string(),
        }
    }
}

/// A kind worker node container and its assigned network identity.
#[derive(Debug, Clone)]
pub struct WorkerNode {
    host: Arc<PhysicalNode>,
    ordinal: usize,
    name: String,
    ip: Ipv4Addr,
    mac: MacAddr,
    nb_remote: String,
    images: ClusterImages,
    last_output: Option<String>,
}

impl WorkerNode {
    /// Create a worker on `host`.
    pub fn new(
        host: Arc<PhysicalNode>,
        ordinal: usize,
        name: impl Into<String>,
        ip: Ipv4Addr,
        mac: MacAddr,
        nb_remote: impl Into<String>,
        images: ClusterImages,
    ) -> Self {
        Self {
            host,
            ordinal,
            name: name.into(),
            ip,
            mac,
            nb_remote: nb_remote.into(),
            images,
            last_output: None,
        }
    }

    /// The physical host running this worker.
    pub fn host(&self) -> &PhysicalNode {
        &self.host
    }

    /// Zero-based ordinal.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Container (and Kubernetes node) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assigned IP address.
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Assigned hardware address.
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Northbound database remote the logical port is registered through.
    pub fn nb_remote(&self) -> &str {
        &self.nb_remote
    }

    /// Kind node image.
    pub fn image_id(&self) -> &str {
        &self.images.base
    }

    /// Workload image.
    pub fn workload_image_id(&self) -> &str {
        &self.images.workload
    }

    /// Last output line captured by the most recent provisioning run.
    pub fn last_output(&self) -> Option<&str> {
        self.last_output.as_deref()
    }

    /// Record the last captured output line.
    pub fn set_last_output(&mut self, line: Option<String>) {
        self.last_output = line;
    }
}

impl fmt::Display for WorkerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} ({} {})",
            self.name, self.host, self.mac, self.ip
        )
    }
}
