//! Process-wide setup shared by the binary and the test harness.
use crate::bootstrap::logging;
use crate::config::Configuration;

/// Initializes everything the node needs before it starts serving.
pub fn setup(cfg: &Configuration) {
    logging::setup(cfg);
}
