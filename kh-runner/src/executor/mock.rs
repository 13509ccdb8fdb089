//! Mock executor for testing.
//!
//! Records every call and fails commands matching configured patterns.

use super::{target_label, ExecError, OutputSink, RemoteExecutor};
use async_trait::async_trait;
use ovn_kh_core::PhysicalNode;
use std::sync::{Arc, Mutex};

/// A command the mock was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Host name.
    pub host: String,
    /// Container, if any.
    pub container: Option<String>,
    /// Command text.
    pub cmd: String,
}

/// Mock executor for testing.
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another.
#[derive(Debug, Default, Clone)]
pub struct MockExecutor {
    inner: Arc<Mutex<MockExecutorInner>>,
}

#[derive(Debug, Default)]
struct MockExecutorInner {
    calls: Vec<RecordedCall>,
    failures: Vec<(String, String)>,
    outputs: Vec<(String, Vec<String>)>,
}

impl MockExecutor {
    /// Create a mock that accepts every command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command containing `pattern`, reporting `stderr`.
    pub fn fail_on(&self, pattern: &str, stderr: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .failures
            .push((pattern.to_string(), stderr.to_string()));
    }

    /// Write `lines` to the sink for every command containing `pattern`.
    pub fn respond(&self, pattern: &str, lines: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.outputs.push((
            pattern.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        ));
    }

    /// All calls, in the order they were made (including failed ones).
    pub fn calls(&self) -> Vec<RecordedCall> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }

    /// Command texts, in call order.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.cmd).collect()
    }

    /// Clear recorded calls and configured behavior.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockExecutorInner::default();
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn run(
        &self,
        host: &PhysicalNode,
        container: Option<&str>,
        cmd: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<(), ExecError> {
        let (lines, failure) = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(RecordedCall {
                host: host.hostname().to_string(),
                container: container.map(str::to_string),
                cmd: cmd.to_string(),
            });
            let lines: Vec<String> = inner
                .outputs
                .iter()
                .filter(|(pattern, _)| cmd.contains(pattern.as_str()))
                .flat_map(|(_, lines)| lines.iter().cloned())
                .collect();
            let failure = inner
                .failures
                .iter()
                .find(|(pattern, _)| cmd.contains(pattern.as_str()))
                .map(|(_, stderr)| stderr.clone());
            (lines, failure)
        };

        for line in &lines {
            sink.write_line(line);
        }

        match failure {
            Some(stderr) => Err(ExecError::CommandFailed {
                target: target_label(host, container),
                exit_code: 1,
                stderr,
            }),
            None => Ok(()),
        }
    }
}
