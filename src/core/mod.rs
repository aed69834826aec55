//! The core tracker: the replicated metadata store one cluster node keeps.
//!
//! It is organized around two serial actors and the state they own:
//!
//! - The **event actor** ([`services::event`]) owns the acceptor side of
//!   the Paxos log ([`paxos::acceptor`]) and the applied metadata state
//!   ([`metadata`]). It services one inbound message at a time: admission
//!   requests from clients, Paxos acceptor traffic from other nodes,
//!   catch-up triggers, and reads.
//! - The **proposer actor** ([`paxos::proposer`]) owns the proposer side:
//!   the current proposal number, round phase, reply tallies and the
//!   backoff timer. It drives pending operations into log slots.
//!
//! The [`pending`] queue is the only structure the two actors share; it is
//! guarded by a mutex and touched only to push, peek and sweep.
//!
//! Nothing in this module knows how requests arrive; the delivery layer
//! lives in [`crate::servers`].
pub mod error;
pub mod metadata;
pub mod paxos;
pub mod pending;
pub mod services;
