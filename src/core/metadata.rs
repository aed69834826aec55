//! The metadata state machine: the applied state every replica folds the
//! committed log prefix into.
//!
//! Two maps: the torrent registry and the per-chunk peer sets. Application
//! is a pure fold, so two replicas with the same committed prefix hold
//! identical maps. The admission checks here are advisory reads of local
//! state; consensus stays authoritative.
use std::collections::{HashMap, HashSet};

use super::error::Error;
use crate::shared::bit_torrent::metainfo::{ChunkId, Metainfo, TorrentId};
use crate::shared::rpc::messages::Operation;

/// The applied state of one replica.
#[derive(Debug, Default)]
pub struct Metadata {
    torrents: HashMap<TorrentId, Metainfo>,
    peers: HashMap<ChunkId, HashSet<String>>,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one committed operation. Deterministic and infallible: a
    /// delete of an absent peer is a no-op, not an error.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Add { chunk, peer } => {
                self.peers.entry(chunk.clone()).or_default().insert(peer.clone());
            }
            Operation::Delete { chunk, peer } => {
                if let Some(holders) = self.peers.get_mut(chunk) {
                    holders.remove(peer);
                }
            }
            Operation::Create { metainfo } => {
                self.torrents.insert(metainfo.id.clone(), metainfo.clone());
            }
        }
    }

    #[must_use]
    pub fn torrent(&self, id: &TorrentId) -> Option<&Metainfo> {
        self.torrents.get(id)
    }

    /// Snapshot of the peers currently holding a chunk, sorted for
    /// determinism.
    #[must_use]
    pub fn peers_with(&self, chunk: &ChunkId) -> Vec<String> {
        let mut holders: Vec<String> = self
            .peers
            .get(chunk)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }

    /// Admission check shared by confirm, report and request: the torrent
    /// must be registered and the chunk index in range.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the admission error to send back to the
    /// caller.
    pub fn check_chunk(&self, chunk: &ChunkId) -> Result<&Metainfo, Error> {
        let metainfo = self
            .torrents
            .get(&chunk.torrent)
            .ok_or_else(|| Error::FileNotFound(chunk.torrent.clone()))?;
        if !metainfo.in_range(chunk.index) {
            return Err(Error::OutOfRange {
                torrent: chunk.torrent.clone(),
                index: chunk.index,
                chunks: metainfo.chunk_count(),
            });
        }
        Ok(metainfo)
    }

    /// Admission check for create: the descriptor's tracker set must equal
    /// the cluster membership (as an unordered set) and the identity must
    /// be new.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the admission error to send back to the
    /// caller.
    pub fn check_create(&self, metainfo: &Metainfo, cluster: &[String]) -> Result<(), Error> {
        let descriptor: HashSet<&str> = metainfo.tracker_nodes.iter().map(String::as_str).collect();
        let members: HashSet<&str> = cluster.iter().map(String::as_str).collect();
        if descriptor != members {
            return Err(Error::InvalidTrackers);
        }
        if self.torrents.contains_key(&metainfo.id) {
            return Err(Error::InvalidId(metainfo.id.clone()));
        }
        Ok(())
    }
}
