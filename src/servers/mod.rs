//! The delivery layer: the TCP server exposing the tracker RPC surface and
//! the signal plumbing used to halt it.
pub mod signals;
pub mod tracker;
