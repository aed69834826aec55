//! The chunk download engine.
//!
//! Chunks are fetched in a random permutation so concurrent downloaders do
//! not pile onto the peers holding the early chunks; within one chunk the
//! candidate peers are tried in a random permutation for the same reason.
//!
//! Failure handling follows a strict split: anything that indicts the
//! download as a whole (unreachable tracker, a descriptor whose hashes
//! disagree with the tracker's, a chunk nobody serves) is fatal; anything
//! that indicts a single peer (dial failure, RPC failure, bad bytes) just
//! advances to the next peer.
use std::path::PathBuf;

use rand::seq::SliceRandom;
use tokio::sync::mpsc;
use tracing::debug;

use super::error::Error;
use super::{responsive_tracker, Command};
use crate::shared::bit_torrent::metainfo::{self, ChunkHash, ChunkId, Metainfo};
use crate::shared::rpc::messages::{PeerReply, PeerRequest, PeerStatus, Status};
use crate::shared::rpc::Connection;

/// Downloads every chunk of `metainfo` into a fresh file at `path`,
/// reporting each verified chunk to the client actor as it lands.
pub(crate) async fn run(
    metainfo: Metainfo,
    path: PathBuf,
    actor_tx: mpsc::Sender<Command>,
) -> Result<(), Error> {
    let mut file = tokio::fs::File::create(&path).await?;
    let tracker = responsive_tracker(&metainfo).await?;

    let mut order: Vec<u32> = (0..metainfo.chunk_count()).collect();
    order.shuffle(&mut rand::thread_rng());

    for index in order {
        let chunk = ChunkId {
            torrent: metainfo.id.clone(),
            index,
        };

        // A tracker that was responsive a moment ago and now is not fails
        // the download; the caller can retry with another descriptor copy.
        let reply = tracker.request_chunk(&chunk).await?;
        if reply.status != Status::Ok {
            return Err(Error::TrackerRejected(reply.status));
        }

        // The tracker pinned one hash per chunk at registration. If our
        // descriptor disagrees, the descriptor is corrupted or forged.
        let expected = match reply.chunk_hash {
            Some(hash) if metainfo.chunk_hash(index) == Some(hash) => hash,
            _ => return Err(Error::CorruptDescriptor { index }),
        };

        fetch_chunk(&metainfo, &mut file, &chunk, reply.peers, expected).await?;

        let _ = actor_tx.send(Command::ChunkDownloaded { chunk }).await;
    }

    debug!(torrent = %metainfo.id, "download complete");
    Ok(())
}

/// Tries each candidate peer until one yields bytes whose SHA-1 matches
/// the descriptor, then writes them at the chunk's offset.
async fn fetch_chunk(
    metainfo: &Metainfo,
    file: &mut tokio::fs::File,
    chunk: &ChunkId,
    mut peers: Vec<String>,
    expected: ChunkHash,
) -> Result<(), Error> {
    peers.shuffle(&mut rand::thread_rng());

    for peer in peers {
        let Ok(mut conn) = Connection::connect(&peer).await else {
            continue;
        };
        let request = PeerRequest::GetChunk { chunk: chunk.clone() };
        let Ok(PeerReply::GetChunk { status, chunk: bytes }) = conn.call(&request).await else {
            continue;
        };
        if status != PeerStatus::Ok {
            continue;
        }
        let Some(bytes) = bytes else {
            continue;
        };
        if ChunkHash::of(&bytes) != expected {
            debug!(%chunk, %peer, "peer served a chunk with a bad hash");
            continue;
        }
        if metainfo::write_chunk(file, metainfo, chunk.index, &bytes).await.is_err() {
            continue;
        }
        return Ok(());
    }

    Err(Error::NoPeerHasChunk { index: chunk.index })
}
