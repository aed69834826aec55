//! Job starters: each job owns one long-running service of the node.
pub mod tracker;
