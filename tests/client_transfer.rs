//! End-to-end peer transfer scenarios: real files, real chunk bytes, real
//! SHA-1 verification, through a real single-node tracker cluster.
//!
//! ```text
//! cargo test --test client_transfer
//! ```
mod common;

use std::path::PathBuf;

use paxtrack::client::{Client, Error};
use paxtrack::shared::bit_torrent::metainfo::{ChunkHash, ChunkId, Metainfo};
use paxtrack::shared::rpc::messages::{PeerReply, PeerRequest, PeerStatus, Status};
use paxtrack::shared::rpc::Connection;

use common::start_cluster;

fn sample_content() -> Vec<u8> {
    // Deterministic but non-repeating across chunk boundaries.
    (0u32..1000).flat_map(u32::to_le_bytes).collect()
}

fn write_sample(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

async fn fetch_from_peer(peer: &str, chunk: ChunkId) -> (PeerStatus, Option<Vec<u8>>) {
    let mut conn = Connection::connect(peer).await.unwrap();
    match conn.call(&PeerRequest::GetChunk { chunk }).await.unwrap() {
        PeerReply::GetChunk { status, chunk } => (status, chunk),
    }
}

#[tokio::test]
async fn should_transfer_a_file_from_seeder_to_leecher_and_verify_every_chunk() {
    let cluster = start_cluster(1).await;
    let dir = tempfile::tempdir().unwrap();
    let content = sample_content();
    let src = write_sample(&dir, "movie.bin", &content);

    let metainfo = Metainfo::generate("movie", &src, 256, cluster.addrs()).unwrap();
    assert_eq!(cluster.client(0).create_entry(&metainfo).await.unwrap(), Status::Ok);

    let seeder = Client::start("127.0.0.1:0").await.unwrap();
    seeder.offer(metainfo.clone(), src).await.unwrap();

    let leecher = Client::start("127.0.0.1:0").await.unwrap();
    let dst = dir.path().join("copy.bin");
    leecher.download(metainfo.clone(), dst.clone()).await.unwrap();

    assert_eq!(std::fs::read(&dst).unwrap(), content);

    // The leecher now serves what it downloaded.
    let chunk = ChunkId {
        torrent: metainfo.id.clone(),
        index: 0,
    };
    let (status, bytes) = fetch_from_peer(leecher.host_port(), chunk).await;
    assert_eq!(status, PeerStatus::Ok);
    assert_eq!(ChunkHash::of(&bytes.unwrap()), metainfo.chunk_hash(0).unwrap());

    seeder.close().await;
    leecher.close().await;
    cluster.shutdown().await;
}

#[tokio::test]
async fn should_answer_chunk_not_found_for_a_torrent_the_peer_does_not_hold() {
    let cluster = start_cluster(1).await;
    let peer = Client::start("127.0.0.1:0").await.unwrap();

    let metainfo = common::fake_metainfo("ghost", cluster.addrs(), 2);
    let (status, bytes) = fetch_from_peer(peer.host_port(), common::chunk(&metainfo, 0)).await;

    assert_eq!(status, PeerStatus::ChunkNotFound);
    assert!(bytes.is_none());

    peer.close().await;
    cluster.shutdown().await;
}

#[tokio::test]
async fn should_fail_over_to_the_next_peer_when_one_is_dead() {
    let cluster = start_cluster(1).await;
    let dir = tempfile::tempdir().unwrap();
    let content = sample_content();
    let src = write_sample(&dir, "movie.bin", &content);

    let metainfo = Metainfo::generate("movie", &src, 256, cluster.addrs()).unwrap();
    let tracker = cluster.client(0);
    assert_eq!(tracker.create_entry(&metainfo).await.unwrap(), Status::Ok);

    let seeder = Client::start("127.0.0.1:0").await.unwrap();
    seeder.offer(metainfo.clone(), src).await.unwrap();

    // A peer that registered and then went away: nothing listens there.
    for index in 0..metainfo.chunk_count() {
        let chunk = ChunkId {
            torrent: metainfo.id.clone(),
            index,
        };
        assert_eq!(
            tracker.confirm_chunk(&chunk, "127.0.0.1:1").await.unwrap(),
            Status::Ok
        );
    }

    let leecher = Client::start("127.0.0.1:0").await.unwrap();
    let dst = dir.path().join("copy.bin");
    leecher.download(metainfo, dst.clone()).await.unwrap();

    assert_eq!(std::fs::read(&dst).unwrap(), content);

    seeder.close().await;
    leecher.close().await;
    cluster.shutdown().await;
}

#[tokio::test]
async fn should_fail_the_download_when_the_descriptor_hashes_are_tampered() {
    let cluster = start_cluster(1).await;
    let dir = tempfile::tempdir().unwrap();
    let content = sample_content();
    let src = write_sample(&dir, "movie.bin", &content);

    let metainfo = Metainfo::generate("movie", &src, 256, cluster.addrs()).unwrap();
    assert_eq!(cluster.client(0).create_entry(&metainfo).await.unwrap(), Status::Ok);

    let seeder = Client::start("127.0.0.1:0").await.unwrap();
    seeder.offer(metainfo.clone(), src).await.unwrap();

    let mut forged = metainfo;
    forged.chunk_hashes.insert(0, ChunkHash([0xBA; 20]));

    let leecher = Client::start("127.0.0.1:0").await.unwrap();
    let result = leecher.download(forged, dir.path().join("copy.bin")).await;

    assert!(matches!(result, Err(Error::CorruptDescriptor { index: 0 })));

    seeder.close().await;
    leecher.close().await;
    cluster.shutdown().await;
}

#[tokio::test]
async fn should_surface_the_failure_when_offering_with_no_reachable_tracker() {
    let dir = tempfile::tempdir().unwrap();
    let content = sample_content();
    let src = write_sample(&dir, "movie.bin", &content);

    let metainfo = Metainfo::generate("movie", &src, 256, vec!["127.0.0.1:1".to_owned()]).unwrap();

    let seeder = Client::start("127.0.0.1:0").await.unwrap();
    let result = seeder.offer(metainfo, src).await;

    assert!(matches!(result, Err(Error::TrackerUnreachable)));

    seeder.close().await;
}

#[tokio::test]
async fn should_surface_the_failure_when_offering_an_unregistered_torrent() {
    let cluster = start_cluster(1).await;
    let dir = tempfile::tempdir().unwrap();
    let content = sample_content();
    let src = write_sample(&dir, "movie.bin", &content);

    // Never registered with a create.
    let metainfo = Metainfo::generate("movie", &src, 256, cluster.addrs()).unwrap();

    let seeder = Client::start("127.0.0.1:0").await.unwrap();
    let result = seeder.offer(metainfo, src).await;

    assert!(matches!(result, Err(Error::UnknownTorrent(_))));

    seeder.close().await;
    cluster.shutdown().await;
}

#[tokio::test]
async fn should_fail_the_download_when_no_peer_serves_a_chunk() {
    let cluster = start_cluster(1).await;
    let dir = tempfile::tempdir().unwrap();
    let content = sample_content();
    let src = write_sample(&dir, "movie.bin", &content);

    let metainfo = Metainfo::generate("movie", &src, 256, cluster.addrs()).unwrap();
    assert_eq!(cluster.client(0).create_entry(&metainfo).await.unwrap(), Status::Ok);

    // The only registered peer is dead.
    let tracker = cluster.client(0);
    let chunk = ChunkId {
        torrent: metainfo.id.clone(),
        index: 0,
    };
    assert_eq!(
        tracker.confirm_chunk(&chunk, "127.0.0.1:1").await.unwrap(),
        Status::Ok
    );

    let leecher = Client::start("127.0.0.1:0").await.unwrap();
    let result = leecher.download(metainfo, dir.path().join("copy.bin")).await;

    assert!(matches!(result, Err(Error::NoPeerHasChunk { .. })));

    leecher.close().await;
    cluster.shutdown().await;
}
