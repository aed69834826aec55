//! Core tracker services: the event actor that owns all acceptor and
//! applied state, and the catch-up routine it runs when this replica falls
//! behind the cluster.
pub mod event;
