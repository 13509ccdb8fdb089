//! Ansible inventory generation.
//!
//! ```text
//! [kind_central]
//! c1 ansible_user=root become=true internal_iface=eth0 node_name=ovn-scale ovn_central=true ovn_host_ip=10.0.0.1
//!
//! [kind_workers]
//! w1 ansible_user=root become=true internal_iface=eth0 node_name=ovn-scale ovn_host_ip=10.0.0.2
//!
//! [kind_nodes:children]
//! kind_central
//! kind_workers
//!
//! [kind_nodes:vars]
//! registry_node=reg
//! rundir=/tmp/run
//! ovn_central_ip=10.0.0.1
//! ovn_gw_ip=172.16.0.1
//! ext_gw_ip=172.16.0.254
//! ```

use ovn_kh_core::PhysicalNode;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use thiserror::Error;

use crate::deployment::Deployment;

/// Inventory generation errors.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A deployment key the inventory needs is absent.
    #[error("deployment is missing required key {field}")]
    Missing {
        /// Deployment key.
        field: &'static str,
    },

    /// Name resolution failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Host name.
        host: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The host resolved, but not to an IPv4 address.
    #[error("{host} has no IPv4 address")]
    NoAddress {
        /// Host name.
        host: String,
    },
}

/// Resolves host names to IPv4 addresses.
pub trait Resolver {
    /// Address of `host`.
    fn resolve(&self, host: &str) -> Result<Ipv4Addr, InventoryError>;
}

/// Resolver backed by the system's name service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr, InventoryError> {
        let addrs = (host, 0u16)
            .to_socket_addrs()
            .map_err(|e| InventoryError::Resolve {
                host: host.to_string(),
                source: e,
            })?;
        addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| InventoryError::NoAddress {
                host: host.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HostLine {
    host: String,
    iface: String,
    ip: Ipv4Addr,
}

/// A resolved inventory, rendered through [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    user: String,
    prefix: String,
    central: HostLine,
    workers: Vec<HostLine>,
    registry_node: String,
    rundir: String,
    ovn_gw_ip: String,
    ext_gw_ip: String,
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, InventoryError> {
    value.as_deref().ok_or(InventoryError::Missing { field })
}

impl Inventory {
    /// Resolve every host of `deployment`.
    pub fn build(
        deployment: &Deployment,
        rundir: &str,
        resolver: &dyn Resolver,
    ) -> Result<Self, InventoryError> {
        let settings = &deployment.settings;
        let registry_node = required(&settings.registry_node, "registry-node")?;
        let default_iface = required(&settings.internal_iface, "internal-iface")?;
        let ovn_gw_ip = required(&settings.ovn_gw_ip, "ovn-gw-ip")?;
        let ext_gw_ip = required(&settings.ext_gw_ip, "ext-gw-ip")?;

        let line = |node: &PhysicalNode| -> Result<HostLine, InventoryError> {
            Ok(HostLine {
                host: node.hostname().to_string(),
                iface: node.internal_iface().unwrap_or(default_iface).to_string(),
                ip: resolver.resolve(node.hostname())?,
            })
        };

        let central = line(deployment.central.as_ref())?;
        let workers = deployment
            .workers
            .iter()
            .map(|node| line(node.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            user: settings.user.clone(),
            prefix: settings.prefix.clone(),
            central,
            workers,
            registry_node: registry_node.to_string(),
            rundir: rundir.to_string(),
            ovn_gw_ip: ovn_gw_ip.to_string(),
            ext_gw_ip: ext_gw_ip.to_string(),
        })
    }

    fn write_host(
        &self,
        f: &mut fmt::Formatter<'_>,
        line: &HostLine,
        central: bool,
    ) -> fmt::Result {
        write!(
            f,
            "{} ansible_user={} become=true internal_iface={} node_name={}",
            line.host, self.user, line.iface, self.prefix
        )?;
        if central {
            f.write_str(" ovn_central=true")?;
        }
        writeln!(f, " ovn_host_ip={}", line.ip)
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[kind_central]")?;
        self.write_host(f, &self.central, true)?;
        writeln!(f)?;

        writeln!(f, "[kind_workers]")?;
        for worker in &self.workers {
            self.write_host(f, worker, false)?;
        }
        writeln!(f)?;

        writeln!(f, "[kind_nodes:children]")?;
        writeln!(f, "kind_central")?;
        writeln!(f, "kind_workers")?;
        writeln!(f)?;

        writeln!(f, "[kind_nodes:vars]")?;
        writeln!(f, "registry_node={}", self.registry_node)?;
        writeln!(f, "rundir={}", self.rundir)?;
        writeln!(f, "ovn_central_ip={}", self.central.ip)?;
        writeln!(f, "ovn_gw_ip={}", self.ovn_gw_ip)?;
        writeln!(f, "ext_gw_ip={}", self.ext_gw_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    struct StaticResolver(HashMap<&'static str, Ipv4Addr>);

    impl Resolver for StaticResolver {
        fn resolve(&self, host: &str) -> Result<Ipv4Addr, InventoryError> {
            self.0
                .get(host)
                .copied()
                .ok_or_else(|| InventoryError::NoAddress {
                    host: host.to_string(),
                })
        }
    }

    fn resolver() -> StaticResolver {
        StaticResolver(HashMap::from([
            ("c1", Ipv4Addr::new(10, 0, 0, 1)),
            ("w1", Ipv4Addr::new(10, 0, 0, 2)),
            ("w2", Ipv4Addr::new(10, 0, 0, 3)),
        ]))
    }

    const DEPLOYMENT: &str = r#"
registry-node: reg
internal-iface: eth0
ovn-gw-ip: 172.16.0.1
ext-gw-ip: 172.16.0.254
central-node:
  name: c1
worker-nodes:
  - w1
  - w2:
      internal-iface: eth1
"#;

    #[test]
    fn renders_exact_layout() {
        let dep = Deployment::from_yaml_str(DEPLOYMENT, Path::new("deployment.yml")).unwrap();
        let inventory = Inventory::build(&dep, "/tmp/run", &resolver()).unwrap();
        let expected = "\
[kind_central]
c1 ansible_user=root become=true internal_iface=eth0 node_name=ovn-scale ovn_central=true ovn_host_ip=10.0.0.1

[kind_workers]
w1 ansible_user=root become=true internal_iface=eth0 node_name=ovn-scale ovn_host_ip=10.0.0.2
w2 ansible_user=root become=true internal_iface=eth1 node_name=ovn-scale ovn_host_ip=10.0.0.3

[kind_nodes:children]
kind_central
kind_workers

[kind_nodes:vars]
registry_node=reg
rundir=/tmp/run
ovn_central_ip=10.0.0.1
ovn_gw_ip=172.16.0.1
ext_gw_ip=172.16.0.254
";
        assert_eq!(inventory.to_string(), expected);
    }

    #[test]
    fn user_and_prefix_are_used() {
        let yaml = format!("user: admin\nprefix: kh\n{}", DEPLOYMENT);
        let dep = Deployment::from_yaml_str(&yaml, Path::new("deployment.yml")).unwrap();
        let text = Inventory::build(&dep, "/r", &resolver()).unwrap().to_string();
        let central = "c1 ansible_user=admin become=true internal_iface=eth0 node_name=kh ";
        assert!(text.contains(central), "{}", text);
    }

    #[test]
    fn missing_gateway_is_reported() {
        let yaml = DEPLOYMENT.replace("ovn-gw-ip: 172.16.0.1\n", "");
        let dep = Deployment::from_yaml_str(&yaml, Path::new("deployment.yml")).unwrap();
        let err = Inventory::build(&dep, "/r", &resolver()).unwrap_err();
        assert!(matches!(err, InventoryError::Missing { field: "ovn-gw-ip" }));
    }

    #[test]
    fn unresolvable_host_is_reported() {
        let yaml = DEPLOYMENT.replace("  - w1\n", "  - w9\n");
        let dep = Deployment::from_yaml_str(&yaml, Path::new("deployment.yml")).unwrap();
        let err = Inventory::build(&dep, "/r", &resolver()).unwrap_err();
        assert_eq!(err.to_string(), "w9 has no IPv4 address");
    }

    #[test]
    fn system_resolver_handles_localhost() {
        let ip = SystemResolver.resolve("localhost").unwrap();
        assert!(ip.is_loopback());
    }
}
