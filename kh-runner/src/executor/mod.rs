//! Remote command execution.
//!
//! The rest of the crate only sees the [`RemoteExecutor`] trait: "run this
//! command on this host, optionally inside this container, and feed its
//! output to this sink". [`SshExecutor`] shells out to `ssh`;
//! [`MockExecutor`] records calls and injects failures for tests.

mod mock;
mod ssh;

pub use mock::{MockExecutor, RecordedCall};
pub use ssh::SshExecutor;

use async_trait::async_trait;
use ovn_kh_core::PhysicalNode;
use thiserror::Error;

/// Remote execution errors.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The transport process could not be started.
    #[error("failed to spawn command for {target}: {source}")]
    Spawn {
        /// `host` or `host/container`.
        target: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The command ran and exited non-zero.
    #[error("command failed on {target}: exit={exit_code}, stderr={stderr}")]
    CommandFailed {
        /// `host` or `host/container`.
        target: String,
        /// Exit code (-1 when killed by a signal).
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// The command did not finish within the executor's timeout.
    #[error("command timed out on {target} after {secs}s")]
    Timeout {
        /// `host` or `host/container`.
        target: String,
        /// Timeout in seconds.
        secs: u64,
    },
}

/// Human-readable execution target.
pub fn target_label(host: &PhysicalNode, container: Option<&str>) -> String {
    match container {
        Some(container) => format!("{}/{}", host.hostname(), container),
        None => host.hostname().to_string(),
    }
}

/// Receives command output line by line.
pub trait OutputSink: Send {
    /// Called for each line of standard output.
    fn write_line(&mut self, line: &str);
}

/// Sink that logs every line and keeps the last non-empty one.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    label: String,
    last: Option<String>,
}

impl CaptureSink {
    /// Create a sink whose log lines are tagged with `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last: None,
        }
    }

    /// The last line written, if any.
    pub fn last_line(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Consume the sink and return the last line.
    pub fn into_last_line(self) -> Option<String> {
        self.last
    }
}

impl OutputSink for CaptureSink {
    fn write_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        tracing::info!(node = %self.label, "{}", line);
        self.last = Some(line.to_string());
    }
}

/// Runs commands on physical hosts or containers running on them.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `cmd` on `host` (inside `container` when given), streaming its
    /// standard output into `sink`.
    ///
    /// Returns an error if the command cannot be started, exits non-zero, or
    /// times out.
    async fn run(
        &self,
        host: &PhysicalNode,
        container: Option<&str>,
        cmd: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<(), ExecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_sink_keeps_last_non_empty_line() {
        let mut sink = CaptureSink::new("ovn-worker3");
        assert!(sink.last_line().is_none());

        sink.write_line("Creating cluster \"ovn\" ...\n");
        sink.write_line("   ");
        assert_eq!(sink.last_line(), Some("Creating cluster \"ovn\" ..."));

        sink.write_line(" ✓ Joining worker nodes 🚜");
        assert_eq!(sink.into_last_line().as_deref(), Some("✓ Joining worker nodes 🚜"));
    }

    #[test]
    fn target_label_includes_container() {
        let host = PhysicalNode::new("w0", true);
        assert_eq!(target_label(&host, None), "w0");
        assert_eq!(target_label(&host, Some("ovn-worker3")), "w0/ovn-worker3");
    }

    #[test]
    fn exec_error_display() {
        let err = ExecError::CommandFailed {
            target: "w0".into(),
            exit_code: 1,
            stderr: "no such node".into(),
        };
        assert_eq!(
            err.to_string(),
            "command failed on w0: exit=1, stderr=no such node"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExecError>();
    }
}
