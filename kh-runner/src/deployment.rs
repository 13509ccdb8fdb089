//! Physical deployment description.
//!
//! ```yaml
//! central-node:
//!   name: ctrl
//! worker-nodes:
//!   - w0
//!   - w1:
//!       internal-iface: eth1
//! ```
//!
//! Inventory generation also reads `user`, `prefix`, `registry-node`,
//! `internal-iface`, `ovn-gw-ip` and `ext-gw-ip`.

use ovn_kh_core::PhysicalNode;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::{parse_yaml, read_yaml, ConfigError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeploymentFile {
    central_node: CentralEntry,
    worker_nodes: Vec<HostEntry>,
    #[serde(default = "default_user")]
    user: String,
    #[serde(default = "default_prefix")]
    prefix: String,
    #[serde(default)]
    registry_node: Option<String>,
    #[serde(default)]
    internal_iface: Option<String>,
    #[serde(default)]
    ovn_gw_ip: Option<String>,
    #[serde(default)]
    ext_gw_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CentralEntry {
    #[serde(default = "default_central_name")]
    name: String,
    #[serde(default)]
    internal_iface: Option<String>,
}

/// A worker host: a bare name, or a single-key mapping of name to overrides.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Name(String),
    WithOverrides(BTreeMap<String, Option<HostOverrides>>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HostOverrides {
    #[serde(default)]
    internal_iface: Option<String>,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_prefix() -> String {
    "ovn-scale".to_string()
}

fn default_central_name() -> String {
    "localhost".to_string()
}

/// Deployment-wide settings that only matter for inventory generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSettings {
    /// Remote user (default `root`).
    pub user: String,
    /// Node name prefix (default `ovn-scale`).
    pub prefix: String,
    /// Host running the image registry.
    pub registry_node: Option<String>,
    /// Default internal interface.
    pub internal_iface: Option<String>,
    /// OVN gateway IP.
    pub ovn_gw_ip: Option<String>,
    /// External gateway IP.
    pub ext_gw_ip: Option<String>,
}

/// A parsed deployment description.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// The central (control-plane) host.
    pub central: Arc<PhysicalNode>,
    /// Worker hosts, in document order.
    pub workers: Vec<Arc<PhysicalNode>>,
    /// Inventory settings.
    pub settings: DeploymentSettings,
}

impl Deployment {
    /// Load a deployment description from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let value = read_yaml(path)?;
        Self::from_value(value, path)
    }

    /// Parse a deployment description from YAML text.
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let value = parse_yaml(content, origin)?;
        Self::from_value(value, origin)
    }

    fn from_value(value: Value, path: &Path) -> Result<Self, ConfigError> {
        let file: DeploymentFile =
            serde_yaml::from_value(value).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut central = PhysicalNode::new(file.central_node.name, false);
        if let Some(iface) = file.central_node.internal_iface {
            central = central.with_internal_iface(iface);
        }

        let workers = file
            .worker_nodes
            .into_iter()
            .map(|entry| entry.into_node().map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            central: Arc::new(central),
            workers,
            settings: DeploymentSettings {
                user: file.user,
                prefix: file.prefix,
                registry_node: file.registry_node,
                internal_iface: file.internal_iface,
                ovn_gw_ip: file.ovn_gw_ip,
                ext_gw_ip: file.ext_gw_ip,
            },
        })
    }
}

impl HostEntry {
    fn into_node(self) -> Result<PhysicalNode, ConfigError> {
        match self {
            HostEntry::Name(name) => Ok(PhysicalNode::new(name, true)),
            HostEntry::WithOverrides(map) => {
                if map.len() != 1 {
                    return Err(ConfigError::InvalidHost {
                        field: "worker-nodes".to_string(),
                        detail: format!("expected a single host name, got {} keys", map.len()),
                    });
                }
                let (name, overrides) = map.into_iter().next().ok_or_else(|| {
                    ConfigError::InvalidHost {
                        field: "worker-nodes".to_string(),
                        detail: "empty mapping".to_string(),
                    }
                })?;
                let node = PhysicalNode::new(name, true);
                Ok(match overrides.unwrap_or_default().internal_iface {
                    Some(iface) => node.with_internal_iface(iface),
                    None => node,
                })
            }
        }
    }
}
