//! The tracker RPC server.
//!
//! One TCP port carries the whole tracker surface: client requests
//! (create, confirm, report, request, trackers), intra-cluster Paxos
//! traffic (prepare, accept, commit, get-op), cluster registration and the
//! test-time control channel. Each connection gets a short-lived task that
//! decodes frames, hands the request to [`handlers`] and writes the reply
//! back; the handlers translate wire requests into core events and wait on
//! a reply channel.
pub mod handlers;
pub mod server;
