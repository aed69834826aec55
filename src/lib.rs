//! Paxtrack: a BitTorrent-style file sharing system whose tracker is a
//! fixed-size cluster of nodes replicating all metadata through a
//! Multi-Paxos log.
//!
//! The crate is split the same way the runtime is:
//!
//! ```text
//! Delivery layer            Domain layer
//!
//! Tracker RPC server |
//! Peer chunk server  |>  Core tracker (Paxos log + metadata state machine)
//! Peer client        |
//! ```
//!
//! - [`core`] contains the replicated log (acceptor, proposer, catch-up),
//!   the metadata state machine and the pending-operation queue. It does not
//!   know how requests arrive.
//! - [`servers`] exposes the tracker surface over TCP and translates wire
//!   requests into core events.
//! - [`client`] is the peer side: it serves chunks it holds, downloads files
//!   chunk by chunk from other peers, and keeps the tracker informed.
//! - [`shared`] holds the vocabulary both sides speak: torrent descriptors,
//!   SHA-1 identifiers, and the framed `bincode` RPC transport.
//! - [`bootstrap`] wires a node together: configuration, logging, cluster
//!   formation through the master, and the two long-lived actors.
//!
//! A cluster tolerates a minority of node failures: every mutation (torrent
//! creation, chunk ownership changes) occupies one slot of the replicated
//! log and is acknowledged to the caller only once the contacted node has
//! applied it. Reads are served from the contacted node's applied state and
//! may lag; the peer client is written to tolerate that.

pub mod app;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod core;
pub mod servers;
pub mod shared;
