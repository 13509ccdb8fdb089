//! Error types for resource allocation.

use thiserror::Error;

/// Errors raised while deriving worker identities and control-plane remotes.
///
/// These are always raised before any remote command is issued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    /// Network string could not be parsed as `a.b.c.d/len`.
    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    /// More workers requested than the pool can address.
    #[error("address pool {network} exhausted: {requested} workers requested, capacity {capacity}")]
    PoolExhausted {
        /// The worker address pool.
        network: String,
        /// Number of workers requested.
        requested: usize,
        /// Maximum number of workers the pool supports.
        capacity: usize,
    },

    /// Workers requested but the deployment lists no worker hosts.
    #[error("no worker hosts in deployment")]
    NoWorkerHosts,

    /// Relay count does not fit in the control-plane network.
    #[error("relay count {requested} out of range for {network}: at most {available} relays")]
    RelayCountOutOfRange {
        /// The control-plane network.
        network: String,
        /// Number of relays requested.
        requested: usize,
        /// Number of relay addresses available after the control-plane replicas.
        available: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_the_pool() {
        let err = AllocError::PoolExhausted {
            network: "10.82.0.0/24".into(),
            requested: 300,
            capacity: 249,
        };
        assert_eq!(
            err.to_string(),
            "address pool 10.82.0.0/24 exhausted: 300 workers requested, capacity 249"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AllocError>();
    }
}
