//! Test configuration document.
//!
//! A YAML mapping whose top-level keys are either reserved control sections
//! (`global`, `cluster`, `base_cluster_bringup`, `ext_cmd`) or test sections.
//! Key order is preserved; tests run in the order they appear.
//!
//! ```yaml
//! global:
//!   log_cmds: true
//! cluster:
//!   n_workers: 4
//!   clustered_db: true
//! base_cluster_bringup:
//!   n_pods_per_node: 10
//! node_ready:
//!   timeout_secs: 300
//! ```

use ovn_kh_core::{
    node_remotes, AllocError, ClusterImages, Ipv4Net, MacEncoding, RemoteTopology, WorkerPool,
    DEFAULT_KIND_NET, DEFAULT_NODE_NET,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Top-level keys that configure the run rather than name a test.
pub const RESERVED_SECTIONS: [&str; 4] = ["global", "cluster", "base_cluster_bringup", "ext_cmd"];

/// Whether `section` is a reserved control section.
pub fn is_reserved(section: &str) -> bool {
    RESERVED_SECTIONS.contains(&section)
}

/// The `global` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalCfg {
    /// Log every remote command at info level.
    #[serde(default)]
    pub log_cmds: bool,
    /// Run each test's cleanup after it finishes.
    #[serde(default)]
    pub cleanup: bool,
}

/// The `cluster` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterCfg {
    /// Number of kind workers to bring up.
    #[serde(default = "default_n_workers")]
    pub n_workers: usize,
    /// Three database replicas instead of one.
    #[serde(default = "default_clustered_db")]
    pub clustered_db: bool,
    /// Number of southbound relays.
    #[serde(default)]
    pub n_relays: usize,
    /// Use SSL for southbound remotes.
    #[serde(default)]
    pub enable_ssl: bool,
    /// Control-plane network the database remotes are taken from.
    #[serde(default = "default_node_net")]
    pub node_net: Ipv4Net,
    /// Kind network worker addresses are taken from.
    #[serde(default = "default_kind_net")]
    pub kind_net: Ipv4Net,
    /// Worker MAC encoding.
    #[serde(default)]
    pub mac_encoding: MacEncoding,
    /// Name of the kind cluster workers join.
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
    /// Kind node image.
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Workload image loaded into every worker.
    #[serde(default = "default_workload_image")]
    pub workload_image: String,
}

/// The `base_cluster_bringup` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterBringupCfg {
    /// Pods each test starts per worker unless it overrides this.
    #[serde(default = "default_n_pods_per_node")]
    pub n_pods_per_node: usize,
}

// Default value functions
fn default_n_workers() -> usize {
    2
}

fn default_clustered_db() -> bool {
    true
}

fn default_node_net() -> Ipv4Net {
    DEFAULT_NODE_NET
}

fn default_kind_net() -> Ipv4Net {
    DEFAULT_KIND_NET
}

fn default_cluster_name() -> String {
    "ovn".to_string()
}

fn default_base_image() -> String {
    ovn_kh_core::node::DEFAULT_BASE_IMAGE.to_string()
}

fn default_workload_image() -> String {
    ovn_kh_core::node::DEFAULT_WORKLOAD_IMAGE.to_string()
}

fn default_n_pods_per_node() -> usize {
    10
}

impl Default for ClusterCfg {
    fn default() -> Self {
        Self {
            n_workers: default_n_workers(),
            clustered_db: default_clustered_db(),
            n_relays: 0,
            enable_ssl: false,
            node_net: default_node_net(),
            kind_net: default_kind_net(),
            mac_encoding: MacEncoding::default(),
            cluster_name: default_cluster_name(),
            base_image: default_base_image(),
            workload_image: default_workload_image(),
        }
    }
}

impl ClusterCfg {
    /// Southbound remote topology.
    pub fn topology(&self) -> RemoteTopology {
        RemoteTopology {
            clustered: self.clustered_db,
            n_relays: self.n_relays,
            enable_ssl: self.enable_ssl,
        }
    }

    /// Comma-joined southbound remotes nodes connect to.
    pub fn node_remotes(&self) -> Result<String, AllocError> {
        node_remotes(&self.node_net, &self.topology())
    }

    /// Worker address pool.
    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.kind_net, self.mac_encoding)
    }

    /// Images used for bring-up.
    pub fn images(&self) -> ClusterImages {
        ClusterImages {
            base: self.base_image.clone(),
            workload: self.workload_image.clone(),
        }
    }
}

impl Default for ClusterBringupCfg {
    fn default() -> Self {
        Self {
            n_pods_per_node: default_n_pods_per_node(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path to the file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// Document root is not a mapping.
    #[error("{path}: top level must be a mapping")]
    NotAMapping {
        /// Path to the file.
        path: PathBuf,
    },

    /// A top-level key is not a string.
    #[error("{path}: section names must be strings, got {key}")]
    InvalidKey {
        /// Path to the file.
        path: PathBuf,
        /// Debug rendering of the offending key.
        key: String,
    },

    /// A section body does not match its expected shape.
    #[error("invalid section {section}: {source}")]
    InvalidSection {
        /// Section name.
        section: String,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// A deployment host entry is malformed.
    #[error("invalid host entry in {field}: {detail}")]
    InvalidHost {
        /// Deployment key the entry belongs to.
        field: String,
        /// What is wrong with it.
        detail: String,
    },

    /// No test implementation for a non-reserved section.
    #[error("unknown test section {section}: no test type {type_name}")]
    UnknownTest {
        /// Section name.
        section: String,
        /// Type identifier the section name maps to.
        type_name: String,
    },
}

/// Read a YAML file into a value.
pub(crate) fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_yaml(&content, path)
}

pub(crate) fn parse_yaml(content: &str, path: &Path) -> Result<Value, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// A parsed test configuration document.
#[derive(Debug, Clone)]
pub struct TestDocument {
    path: PathBuf,
    sections: Mapping,
    global: GlobalCfg,
    cluster: ClusterCfg,
    bringup: ClusterBringupCfg,
}

impl TestDocument {
    /// Load a document from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let value = read_yaml(path)?;
        Self::from_value(value, path)
    }

    /// Parse a document from YAML text; `origin` is used in error messages.
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let value = parse_yaml(content, origin)?;
        Self::from_value(value, origin)
    }

    fn from_value(value: Value, path: &Path) -> Result<Self, ConfigError> {
        let sections = match value {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            _ => {
                return Err(ConfigError::NotAMapping {
                    path: path.to_path_buf(),
                })
            }
        };
        if let Some(key) = sections.keys().find(|k| !k.is_string()) {
            return Err(ConfigError::InvalidKey {
                path: path.to_path_buf(),
                key: format!("{:?}", key),
            });
        }

        let mut doc = Self {
            path: path.to_path_buf(),
            sections,
            global: GlobalCfg::default(),
            cluster: ClusterCfg::default(),
            bringup: ClusterBringupCfg::default(),
        };
        doc.global = doc.section_as("global")?;
        doc.cluster = doc.section_as("cluster")?;
        doc.bringup = doc.section_as("base_cluster_bringup")?;
        Ok(doc)
    }

    /// Where the document came from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `global` section.
    pub fn global(&self) -> &GlobalCfg {
        &self.global
    }

    /// The `cluster` section.
    pub fn cluster(&self) -> &ClusterCfg {
        &self.cluster
    }

    /// The `base_cluster_bringup` section.
    pub fn bringup(&self) -> &ClusterBringupCfg {
        &self.bringup
    }

    /// Raw body of a section.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// Deserialize a section; a missing or empty section yields the default.
    pub fn section_as<T>(&self, name: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.section(name) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => {
                serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidSection {
                    section: name.to_string(),
                    source: e,
                })
            }
        }
    }

    /// All section names, in document order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().filter_map(Value::as_str)
    }

    /// Non-reserved section names, in document order.
    pub fn test_sections(&self) -> impl Iterator<Item = &str> {
        self.section_names().filter(|name| !is_reserved(name))
    }
}
