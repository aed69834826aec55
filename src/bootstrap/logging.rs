//! Setup for the application logging.
//!
//! It redirects the tracing output to stdout with the maximum level taken
//! from the configuration (case is ignored):
//!
//! - `off` (i.e. don't install a subscriber at all)
//! - `error`
//! - `warn`
//! - `info` (default)
//! - `debug`
//! - `trace`
use std::sync::Once;

use tracing::debug;
use tracing::level_filters::LevelFilter;

use crate::config::Configuration;

static INIT: Once = Once::new();

/// It redirects the tracing output to stdout with the level defined in the
/// configuration.
pub fn setup(cfg: &Configuration) {
    let filter = level_filter(cfg.log_level.as_deref());

    if filter == LevelFilter::OFF {
        return;
    }

    INIT.call_once(|| {
        tracing_subscriber::fmt().with_max_level(filter).init();
        debug!("logging initialized.");
    });
}

/// # Panics
///
/// Panics if the configured level is not one of the recognized names.
fn level_filter(level: Option<&str>) -> LevelFilter {
    match level {
        None => LevelFilter::INFO,
        Some(level) => level
            .parse()
            .unwrap_or_else(|_| panic!("unrecognized log level `{level}`")),
    }
}
