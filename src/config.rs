//! Tracker node configuration.
//!
//! A node is fully described by its listen port, the size of the cluster it
//! belongs to, its stable `node_id` within that cluster and, for every node
//! except the master, the master's address. The remaining fields are
//! protocol tunables with production defaults; tests shrink them to
//! millisecond scale so Paxos rounds and registration retries converge
//! quickly.
use std::time::Duration;

/// Initial backoff, expressed in units of [`Configuration::backoff_base`].
pub const INITIAL_BACKOFF_UNITS: u64 = 2;

#[derive(Clone, Debug)]
pub struct Configuration {
    /// TCP port the tracker RPC surface binds to. `0` asks the OS for an
    /// ephemeral port, which is what the test harness uses.
    pub port: u16,
    /// Fixed cluster size. Membership never changes after bootstrap.
    pub cluster_size: usize,
    /// This node's position in the cluster, in `[0, cluster_size)`.
    pub node_id: u32,
    /// Address of the master node. `None` means this node is the master.
    pub master_addr: Option<String>,
    /// Maximum verbosity for the tracing subscriber (`off`, `error`, `warn`,
    /// `info`, `debug`, `trace`). `None` keeps the default (`info`).
    pub log_level: Option<String>,
    /// How long a slave waits between registration attempts.
    pub register_period: Duration,
    /// One backoff unit for the proposer's round-expiry timer.
    pub backoff_base: Duration,
    /// Upper bound on the backoff, in units. The raw growth formula is
    /// super-linear and must be clamped.
    pub backoff_cap_units: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            port: 6969,
            cluster_size: 1,
            node_id: 0,
            master_addr: None,
            log_level: None,
            register_period: Duration::from_secs(1),
            backoff_base: Duration::from_secs(1),
            backoff_cap_units: 64,
        }
    }
}

impl Configuration {
    /// A node with no master address is the master.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.master_addr.is_none()
    }

    /// Strict majority of the cluster, the quorum every Paxos phase needs.
    #[must_use]
    pub fn majority(&self) -> usize {
        self.cluster_size / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::Configuration;

    #[test]
    fn should_treat_a_node_without_master_address_as_the_master() {
        let cfg = Configuration::default();

        assert!(cfg.is_master());
    }

    #[test]
    fn should_compute_a_strict_majority() {
        let mut cfg = Configuration::default();

        cfg.cluster_size = 1;
        assert_eq!(cfg.majority(), 1);

        cfg.cluster_size = 3;
        assert_eq!(cfg.majority(), 2);

        cfg.cluster_size = 4;
        assert_eq!(cfg.majority(), 3);
    }
}
