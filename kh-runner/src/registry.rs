//! Test registry.
//!
//! Every non-reserved section of a test document names a test. The section
//! name (`snake_case`) maps to a type name (`UpperCamel`), which is looked up
//! in a table of factories filled at construction time.
//!
//! # Example
//!
//! ```ignore
//! let registry = TestRegistry::builtin();
//! let tests = registry.configure_tests(&doc, &central, &workers)?;
//! for test in &tests {
//!     test.run(&env).await?;
//! }
//! ```

use async_trait::async_trait;
use ovn_kh_core::{PhaseSink, PhysicalNode, WorkerNode};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ClusterBringupCfg, ClusterCfg, ConfigError, GlobalCfg, TestDocument};
use crate::executor::{ExecError, RemoteExecutor};
use crate::scale_tests::{DensityLight, NodeReady};

/// Errors raised while a test runs.
#[derive(Debug, Error)]
pub enum TestError {
    /// A remote command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// The cluster did not reach the state the test expects.
    #[error("{0}")]
    Failed(String),
}

/// Everything a running test may use.
pub struct TestEnv<'a> {
    /// The `global` section.
    pub global: &'a GlobalCfg,
    /// The `cluster` section.
    pub cluster: &'a ClusterCfg,
    /// The `base_cluster_bringup` section.
    pub bringup: &'a ClusterBringupCfg,
    /// The central node.
    pub central: &'a PhysicalNode,
    /// Provisioned workers.
    pub workers: &'a [WorkerNode],
    /// Command transport.
    pub executor: &'a dyn RemoteExecutor,
    /// Where phase records go.
    pub phases: Arc<dyn PhaseSink>,
}

/// A configured scale test.
#[async_trait]
pub trait ScaleTest: Send + Sync {
    /// Section name the test was configured from.
    fn name(&self) -> &str;

    /// Run the test. Each test opens its own phases.
    async fn run(&self, env: &TestEnv<'_>) -> Result<(), TestError>;

    /// Undo whatever `run` created. Only called when `global.cleanup` is set.
    async fn cleanup(&self, _env: &TestEnv<'_>) -> Result<(), TestError> {
        Ok(())
    }
}

/// Builds a test from its section of the document.
pub type TestFactory = fn(
    doc: &TestDocument,
    section: &str,
    central: &PhysicalNode,
    workers: &[WorkerNode],
) -> Result<Box<dyn ScaleTest>, ConfigError>;

/// Map a section name to its test type name: `density_light` -> `DensityLight`.
pub fn canonical_type_name(section: &str) -> String {
    section
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Type name to factory table.
#[derive(Clone, Default)]
pub struct TestRegistry {
    factories: BTreeMap<String, TestFactory>,
}

impl TestRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in tests.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("NodeReady", NodeReady::from_document);
        registry.register("DensityLight", DensityLight::from_document);
        registry
    }

    /// Register `factory` under `type_name`, replacing any previous entry.
    pub fn register(&mut self, type_name: impl Into<String>, factory: TestFactory) {
        self.factories.insert(type_name.into(), factory);
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Factory for a section name.
    pub fn resolve(&self, section: &str) -> Result<TestFactory, ConfigError> {
        let type_name = canonical_type_name(section);
        self.factories
            .get(&type_name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownTest {
                section: section.to_string(),
                type_name,
            })
    }

    /// Build a test for every non-reserved section, in document order.
    ///
    /// Fails on the first section that does not resolve or does not parse.
    pub fn configure_tests(
        &self,
        doc: &TestDocument,
        central: &PhysicalNode,
        workers: &[WorkerNode],
    ) -> Result<Vec<Box<dyn ScaleTest>>, ConfigError> {
        doc.test_sections()
            .map(|section| {
                let factory = self.resolve(section)?;
                let test = factory(doc, section, central, workers)?;
                tracing::debug!(section, "configured test");
                Ok(test)
            })
            .collect()
    }
}

impl std::fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct Noop(String);

    #[async_trait]
    impl ScaleTest for Noop {
        fn name(&self) -> &str {
            &self.0
        }

        async fn run(&self, _env: &TestEnv<'_>) -> Result<(), TestError> {
            Ok(())
        }
    }

    fn noop(
        _doc: &TestDocument,
        section: &str,
        _central: &PhysicalNode,
        _workers: &[WorkerNode],
    ) -> Result<Box<dyn ScaleTest>, ConfigError> {
        Ok(Box::new(Noop(section.to_string())))
    }

    fn doc(yaml: &str) -> TestDocument {
        TestDocument::from_yaml_str(yaml, Path::new("test.yml")).unwrap()
    }

    #[test]
    fn type_names_are_upper_camel() {
        assert_eq!(canonical_type_name("density_light"), "DensityLight");
        assert_eq!(canonical_type_name("node_ready"), "NodeReady");
        assert_eq!(canonical_type_name("netpol_multitenant"), "NetpolMultitenant");
        assert_eq!(canonical_type_name("cluster_density_v2"), "ClusterDensityV2");
        assert_eq!(canonical_type_name("already_camelCase"), "AlreadyCamelCase");
        assert_eq!(canonical_type_name("_leading__double_"), "LeadingDouble");
        assert_eq!(canonical_type_name(""), "");
    }

    #[test]
    fn builtin_registry_contents() {
        let registry = TestRegistry::builtin();
        let names: Vec<_> = registry.type_names().collect();
        assert_eq!(names, vec!["DensityLight", "NodeReady"]);
        assert!(registry.resolve("node_ready").is_ok());
    }

    #[test]
    fn tests_are_built_in_document_order() {
        let mut registry = TestRegistry::new();
        registry.register("Zeta", noop);
        registry.register("Alpha", noop);
        let doc = doc("global: {}\nzeta: {}\nbase_cluster_bringup: {}\nalpha: {}\next_cmd: {}\n");

        let central = PhysicalNode::new("ctrl", false);
        let tests = registry.configure_tests(&doc, &central, &[]).unwrap();
        let names: Vec<_> = tests.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn reserved_sections_are_never_resolved() {
        // An empty registry accepts a document holding only reserved sections.
        let doc = doc("global: {}\ncluster: {}\nbase_cluster_bringup: {}\next_cmd: {}\n");
        let central = PhysicalNode::new("ctrl", false);
        let tests = TestRegistry::new()
            .configure_tests(&doc, &central, &[])
            .unwrap();
        assert!(tests.is_empty());
    }

    #[test]
    fn unknown_section_is_a_config_error() {
        let doc = doc("node_ready: {}\nfoo_bar: {}\n");
        let central = PhysicalNode::new("ctrl", false);
        let err = TestRegistry::builtin()
            .configure_tests(&doc, &central, &[])
            .err()
            .unwrap();
        match err {
            ConfigError::UnknownTest { section, type_name } => {
                assert_eq!(section, "foo_bar");
                assert_eq!(type_name, "FooBar");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_section_body_is_a_config_error() {
        let doc = doc("node_ready:\n  timeout_secs: soon\n");
        let central = PhysicalNode::new("ctrl", false);
        let err = TestRegistry::builtin()
            .configure_tests(&doc, &central, &[])
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConfigError::InvalidSection { ref section, .. } if section == "node_ready"
        ));
    }
}
