//! Wire messages for the two RPC surfaces: the tracker surface (client
//! requests plus intra-cluster Paxos traffic) and the peer surface (chunk
//! transfer between clients).
//!
//! The replicated log's payload, [`Operation`], lives here too: it is the
//! protocol vocabulary both the wire and the state machine speak.
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::shared::bit_torrent::metainfo::{ChunkHash, ChunkId, Metainfo, TorrentId};

/// Status codes shared by every tracker reply.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Reject,
    OutOfDate,
    NotReady,
    FileNotFound,
    OutOfRange,
    InvalidId,
    InvalidTrackers,
}

/// One member of the tracker cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub host_port: String,
    pub node_id: u32,
}

/// A committed log entry: the mutation one slot of the replicated log
/// carries. There is no "empty" kind; a slot that has no value yet is
/// simply absent from the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// A peer announced it holds a chunk.
    Add { chunk: ChunkId, peer: String },
    /// A peer reported it no longer holds a chunk.
    Delete { chunk: ChunkId, peer: String },
    /// A new torrent enters the registry.
    Create { metainfo: Metainfo },
}

impl Operation {
    /// The torrent the operation is about, for logging.
    #[must_use]
    pub fn torrent(&self) -> &TorrentId {
        match self {
            Operation::Add { chunk, .. } | Operation::Delete { chunk, .. } => &chunk.torrent,
            Operation::Create { metainfo } => &metainfo.id,
        }
    }
}

/// Requests accepted on a tracker node's RPC port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TrackerRequest {
    /// Cluster formation: a slave announces itself to the master.
    Register { info: NodeInfo },
    /// Paxos phase one.
    Prepare { n: u64, slot: u64 },
    /// Paxos phase two.
    Accept { n: u64, slot: u64, op: Operation },
    /// A decided value for a slot.
    Commit { slot: u64, op: Operation },
    /// Catch-up: fetch the committed value of one slot.
    GetOp { slot: u64 },
    /// Register a new torrent.
    Create { metainfo: Metainfo },
    /// Announce chunk ownership.
    Confirm { chunk: ChunkId, peer: String },
    /// Retract chunk ownership.
    Report { chunk: ChunkId, peer: String },
    /// Look up the peers holding a chunk.
    Request { chunk: ChunkId },
    /// List the cluster members.
    GetTrackers,
    /// Test-time control: positive seconds stall both actors, zero or
    /// negative shuts the node down.
    Stall { seconds: i64 },
}

/// Reply to [`TrackerRequest::Prepare`].
///
/// On `Ok` this is a promise: `n`/`op` carry the highest accepted proposal
/// for the slot, if any. On `Reject` `n` carries the acceptor's highest
/// promised number so a duelling proposer can outbid it. On `OutOfDate`
/// `op` carries the already-committed value of the requested slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepareReply {
    pub status: Status,
    pub n: u64,
    pub op: Option<Operation>,
    pub seq: u64,
}

/// Reply to [`TrackerRequest::Request`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestReply {
    pub status: Status,
    pub peers: Vec<String>,
    pub chunk_hash: Option<ChunkHash>,
}

/// Replies sent on a tracker node's RPC port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TrackerReply {
    Register { status: Status, nodes: Vec<NodeInfo> },
    Prepare(PrepareReply),
    Accept { status: Status },
    /// Carries the committer's sequence number after applying the slot, so
    /// the proposer learns where the log ends without reading acceptor
    /// state.
    Commit { seq: u64 },
    GetOp { status: Status, op: Option<Operation> },
    /// Shared by `Create`, `Confirm` and `Report`.
    Update { status: Status },
    Request(RequestReply),
    Trackers { status: Status, host_ports: Vec<String> },
    Stall,
}

/// Requests accepted on a peer client's serving port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerRequest {
    GetChunk { chunk: ChunkId },
}

/// Status codes for the peer surface. Every serving failure collapses to
/// `ChunkNotFound`: the peer's answer is "can I serve it now?", never why
/// not.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    Ok,
    ChunkNotFound,
}

/// Replies sent on a peer client's serving port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerReply {
    GetChunk {
        status: PeerStatus,
        chunk: Option<Vec<u8>>,
    },
}
