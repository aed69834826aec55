//! Tracker application assembly.
//!
//! A node runs exactly one job: the tracker itself (RPC surface, cluster
//! formation, the two actors). This module is the thin seam between the
//! binary and the bootstrap machinery; the test harness skips it and uses
//! [`crate::bootstrap::jobs::tracker`] directly to control bind and start
//! separately.
use tracing::info;

use crate::bootstrap::jobs::tracker::{self, Error, RunningTracker};
use crate::config::Configuration;

/// Starts a tracker node.
///
/// # Errors
///
/// Will return `Err` on bootstrap failure, the only failure that is fatal
/// to the process.
pub async fn start(cfg: Configuration) -> Result<RunningTracker, Error> {
    info!(
        port = cfg.port,
        cluster_size = cfg.cluster_size,
        node_id = cfg.node_id,
        master = cfg.is_master(),
        "starting tracker node"
    );
    tracker::start_job(cfg).await
}
