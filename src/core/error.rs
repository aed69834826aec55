//! Admission errors returned by the core tracker.
//!
//! Error | Description
//! ---|---
//! `FileNotFound` | The operation names a torrent the registry does not contain.
//! `OutOfRange` | The chunk index does not exist for that torrent.
//! `InvalidId` | A create for a torrent identity that is already registered.
//! `InvalidTrackers` | A create whose descriptor lists a different tracker set than the cluster.
//!
//! Admission runs synchronously on the contacted node before any Paxos
//! activity; a failed check never enters the log.
use thiserror::Error;

use crate::shared::bit_torrent::metainfo::TorrentId;
use crate::shared::rpc::messages::Status;

/// Admission error returned by the core tracker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("torrent `{0}` is not registered")]
    FileNotFound(TorrentId),

    #[error("chunk {index} is out of range for `{torrent}` ({chunks} chunks)")]
    OutOfRange {
        torrent: TorrentId,
        index: u32,
        chunks: u32,
    },

    #[error("torrent `{0}` is already registered")]
    InvalidId(TorrentId),

    #[error("descriptor tracker set does not match the cluster membership")]
    InvalidTrackers,
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        match err {
            Error::FileNotFound(_) => Status::FileNotFound,
            Error::OutOfRange { .. } => Status::OutOfRange,
            Error::InvalidId(_) => Status::InvalidId,
            Error::InvalidTrackers => Status::InvalidTrackers,
        }
    }
}
