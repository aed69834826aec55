//! In-process cluster harness shared by the integration tests.
//!
//! A whole tracker cluster runs inside the test's tokio runtime on
//! ephemeral ports: the master is bound first so its address is known,
//! then master and slaves bootstrap concurrently. Protocol tunables are
//! shrunk to millisecond scale so rounds and retries converge quickly.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use paxtrack::bootstrap::jobs::tracker::{bind, RunningTracker};
use paxtrack::config::Configuration;
use paxtrack::shared::bit_torrent::info_hash::InfoHash;
use paxtrack::shared::bit_torrent::metainfo::{ChunkHash, ChunkId, Metainfo, TorrentId};
use paxtrack::shared::rpc::messages::Status;
use paxtrack::shared::rpc::node_client::NodeClient;

pub fn test_config(cluster_size: usize, node_id: u32, master_addr: Option<String>) -> Configuration {
    Configuration {
        port: 0,
        cluster_size,
        node_id,
        master_addr,
        log_level: Some("off".to_owned()),
        register_period: Duration::from_millis(50),
        backoff_base: Duration::from_millis(25),
        backoff_cap_units: 64,
    }
}

pub struct Cluster {
    addrs: Vec<String>,
    nodes: Vec<Option<RunningTracker>>,
}

impl Cluster {
    pub fn addrs(&self) -> Vec<String> {
        self.addrs.clone()
    }

    pub fn addr(&self, node_id: usize) -> &str {
        &self.addrs[node_id]
    }

    pub fn client(&self, node_id: usize) -> NodeClient {
        NodeClient::new(self.addrs[node_id].clone())
    }

    /// Kills one node: its actors stop and its listener halts.
    pub async fn kill(&mut self, node_id: usize) {
        if let Some(node) = self.nodes[node_id].take() {
            node.shutdown().await;
        }
    }

    pub async fn shutdown(mut self) {
        for node_id in 0..self.nodes.len() {
            self.kill(node_id).await;
        }
    }
}

/// Starts an `n`-node cluster and waits for bootstrap to finish on every
/// node.
pub async fn start_cluster(n: usize) -> Cluster {
    let master_bound = bind(test_config(n, 0, None)).await.expect("master should bind");
    let master_addr = master_bound.local_addr().to_string();

    let mut addrs = vec![master_addr.clone()];
    let mut starting = vec![tokio::spawn(master_bound.start())];

    for node_id in 1..n {
        let cfg = test_config(n, u32::try_from(node_id).unwrap(), Some(master_addr.clone()));
        let bound = bind(cfg).await.expect("slave should bind");
        addrs.push(bound.local_addr().to_string());
        starting.push(tokio::spawn(bound.start()));
    }

    let mut nodes = Vec::with_capacity(n);
    for task in starting {
        let tracker = task
            .await
            .expect("bootstrap task should not panic")
            .expect("bootstrap should succeed");
        nodes.push(Some(tracker));
    }

    Cluster { addrs, nodes }
}

/// A descriptor with fabricated chunk hashes, enough for tracker-side
/// scenarios that never move real bytes.
pub fn fake_metainfo(name: &str, tracker_nodes: Vec<String>, chunk_count: u32) -> Metainfo {
    let chunk_hashes: BTreeMap<u32, ChunkHash> = (0..chunk_count)
        .map(|i| (i, ChunkHash([u8::try_from(i).unwrap() + 1; 20])))
        .collect();
    Metainfo {
        id: TorrentId {
            name: name.to_owned(),
            info_hash: InfoHash::of(name.as_bytes()),
        },
        tracker_nodes,
        chunk_hashes,
        chunk_size: 4,
        file_size: u64::from(chunk_count) * 4,
    }
}

pub fn chunk(metainfo: &Metainfo, index: u32) -> ChunkId {
    ChunkId {
        torrent: metainfo.id.clone(),
        index,
    }
}

/// Confirms a chunk against one node, retrying while that node still lags
/// behind the committed prefix (it answers `FileNotFound` until the create
/// reaches it). Panics if the node never accepts within the deadline.
pub async fn confirm_with_retry(
    tracker: &NodeClient,
    chunk: &ChunkId,
    peer: &str,
    deadline: Duration,
) {
    let started = tokio::time::Instant::now();
    loop {
        let status = tracker.confirm_chunk(chunk, peer).await.expect("node should answer");
        if status == Status::Ok {
            return;
        }
        assert!(
            started.elapsed() < deadline,
            "node never accepted the confirm, last status {status}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Whether two nodes answer `GetOp` identically for every slot in
/// `[0, slots)`.
pub async fn logs_match(a: &NodeClient, b: &NodeClient, slots: u64) -> bool {
    for slot in 0..slots {
        let (status_a, op_a) = a.get_op(slot).await.expect("node a should answer");
        let (status_b, op_b) = b.get_op(slot).await.expect("node b should answer");
        if status_a != Status::Ok || status_b != Status::Ok || op_a != op_b {
            return false;
        }
    }
    true
}

/// Polls until `logs_match` holds or the deadline passes.
pub async fn wait_for_log_agreement(a: &NodeClient, b: &NodeClient, slots: u64, deadline: Duration) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if logs_match(a, b, slots).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
