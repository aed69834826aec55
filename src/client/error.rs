//! Fatal errors surfaced by the peer client.
//!
//! Only download-killing conditions appear here. Transient per-peer
//! failures (a dead peer, a bad hash from one peer, a failed write) are
//! swallowed by the download engine, which simply advances to the next
//! peer.
use thiserror::Error;

use crate::shared::bit_torrent::metainfo::TorrentId;
use crate::shared::rpc;
use crate::shared::rpc::messages::Status;

#[derive(Error, Debug)]
pub enum Error {
    #[error("could not find a responsive tracker")]
    TrackerUnreachable,

    #[error("tracker call failed: {0}")]
    Rpc(#[from] rpc::Error),

    #[error("tracker rejected the request: {0}")]
    TrackerRejected(Status),

    #[error("torrent `{0}` is not registered with the tracker")]
    UnknownTorrent(TorrentId),

    /// The descriptor's hash for a chunk disagrees with the tracker's.
    /// Since the tracker pins exactly one hash per chunk at registration,
    /// this means the descriptor is corrupted or forged.
    #[error("descriptor hash mismatch for chunk {index}")]
    CorruptDescriptor { index: u32 },

    #[error("no peer served a valid copy of chunk {index}")]
    NoPeerHasChunk { index: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("client is closed")]
    Closed,
}
