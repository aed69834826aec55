//! End-to-end tracker cluster scenarios.
//!
//! ```text
//! cargo test --test tracker_cluster
//! ```
//!
//! Everything here drives real nodes over real sockets through the public
//! RPC surface; nothing reaches into actor internals.
mod common;

use std::time::Duration;

use paxtrack::shared::rpc::messages::Status;

use common::{chunk, confirm_with_retry, fake_metainfo, start_cluster, wait_for_log_agreement};

#[tokio::test]
async fn should_serve_create_confirm_report_and_request_on_a_single_node() {
    let cluster = start_cluster(1).await;
    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    assert_eq!(tracker.create_entry(&metainfo).await.unwrap(), Status::Ok);

    assert_eq!(
        tracker.confirm_chunk(&chunk(&metainfo, 0), "banana").await.unwrap(),
        Status::Ok
    );
    assert_eq!(
        tracker.confirm_chunk(&chunk(&metainfo, 0), "apple").await.unwrap(),
        Status::Ok
    );
    assert_eq!(
        tracker.report_missing(&chunk(&metainfo, 0), "banana").await.unwrap(),
        Status::Ok
    );

    let reply = tracker.request_chunk(&chunk(&metainfo, 0)).await.unwrap();

    assert_eq!(reply.status, Status::Ok);
    assert_eq!(reply.peers, vec!["apple".to_owned()]);
    assert_eq!(reply.chunk_hash, metainfo.chunk_hash(0));

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_reject_a_second_create_for_the_same_identity() {
    let cluster = start_cluster(1).await;
    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    assert_eq!(tracker.create_entry(&metainfo).await.unwrap(), Status::Ok);
    assert_eq!(tracker.create_entry(&metainfo).await.unwrap(), Status::InvalidId);

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_reject_a_create_whose_tracker_set_differs_and_log_nothing() {
    let cluster = start_cluster(1).await;
    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", vec!["127.0.0.1:1".to_owned()], 3);

    assert_eq!(
        tracker.create_entry(&metainfo).await.unwrap(),
        Status::InvalidTrackers
    );

    // The rejected create never entered the log.
    let (status, op) = tracker.get_op(0).await.unwrap();
    assert_ne!(status, Status::Ok);
    assert!(op.is_none());

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_keep_committing_after_one_node_of_three_dies() {
    let mut cluster = start_cluster(3).await;
    cluster.kill(2).await;

    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    assert_eq!(tracker.create_entry(&metainfo).await.unwrap(), Status::Ok);
    assert_eq!(
        tracker.confirm_chunk(&chunk(&metainfo, 0), "banana").await.unwrap(),
        Status::Ok
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_commit_nothing_after_two_nodes_of_three_die() {
    let mut cluster = start_cluster(3).await;
    cluster.kill(1).await;
    cluster.kill(2).await;

    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    let verdict = tokio::time::timeout(Duration::from_secs(15), tracker.create_entry(&metainfo)).await;

    assert!(verdict.is_err(), "a minority must not make progress");

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_let_a_stalled_node_catch_up_with_the_cluster_log() {
    let cluster = start_cluster(3).await;
    let node0 = cluster.client(0);
    let node2 = cluster.client(2);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    node2.stall(3).await.unwrap();

    // Progress happens while node 2 is parked.
    assert_eq!(node0.create_entry(&metainfo).await.unwrap(), Status::Ok);
    assert_eq!(
        node0.confirm_chunk(&chunk(&metainfo, 0), "banana").await.unwrap(),
        Status::Ok
    );

    // Once node 2 resumes it must accept updates again; it may answer
    // FileNotFound for a moment while the missed commits drain.
    confirm_with_retry(&node2, &chunk(&metainfo, 0), "apple", Duration::from_secs(10)).await;

    assert!(
        wait_for_log_agreement(&node0, &node2, 3, Duration::from_secs(10)).await,
        "stalled node's log never converged"
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_agree_on_the_log_when_mutations_go_through_different_nodes() {
    let cluster = start_cluster(3).await;
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    assert_eq!(cluster.client(0).create_entry(&metainfo).await.unwrap(), Status::Ok);
    confirm_with_retry(
        &cluster.client(1),
        &chunk(&metainfo, 0),
        "banana",
        Duration::from_secs(10),
    )
    .await;
    confirm_with_retry(
        &cluster.client(2),
        &chunk(&metainfo, 1),
        "apple",
        Duration::from_secs(10),
    )
    .await;

    let node0 = cluster.client(0);
    for other in 1..3 {
        let other = cluster.client(other);
        assert!(
            wait_for_log_agreement(&node0, &other, 3, Duration::from_secs(10)).await,
            "logs diverged"
        );
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_only_remove_a_peer_through_its_own_report() {
    let cluster = start_cluster(1).await;
    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    assert_eq!(tracker.create_entry(&metainfo).await.unwrap(), Status::Ok);
    assert_eq!(
        tracker.confirm_chunk(&chunk(&metainfo, 0), "banana").await.unwrap(),
        Status::Ok
    );

    // Another peer reporting the chunk missing must not evict "banana".
    assert_eq!(
        tracker.report_missing(&chunk(&metainfo, 0), "apple").await.unwrap(),
        Status::Ok
    );

    let reply = tracker.request_chunk(&chunk(&metainfo, 0)).await.unwrap();
    assert_eq!(reply.peers, vec!["banana".to_owned()]);

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_reject_chunk_operations_outside_the_descriptor_range() {
    let cluster = start_cluster(1).await;
    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 3);

    assert_eq!(tracker.create_entry(&metainfo).await.unwrap(), Status::Ok);

    assert_eq!(
        tracker.confirm_chunk(&chunk(&metainfo, 3), "banana").await.unwrap(),
        Status::OutOfRange
    );
    assert_eq!(
        tracker
            .request_chunk(&chunk(&fake_metainfo("ghost", cluster.addrs(), 1), 0))
            .await
            .unwrap()
            .status,
        Status::FileNotFound
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_shut_down_cleanly_over_the_control_channel() {
    let cluster = start_cluster(1).await;
    let tracker = cluster.client(0);
    let metainfo = fake_metainfo("movie", cluster.addrs(), 1);

    tracker.stall(0).await.unwrap();

    // The actors are gone; nothing commits any more.
    let verdict = tokio::time::timeout(Duration::from_secs(2), tracker.create_entry(&metainfo)).await;
    assert!(!matches!(verdict, Ok(Ok(Status::Ok))));

    cluster.shutdown().await;
}

#[tokio::test]
async fn should_list_every_cluster_member_to_any_caller() {
    let cluster = start_cluster(3).await;

    let (status, mut host_ports) = cluster.client(1).get_trackers().await.unwrap();
    host_ports.sort();
    let mut expected = cluster.addrs();
    expected.sort();

    assert_eq!(status, Status::Ok);
    assert_eq!(host_ports, expected);

    cluster.shutdown().await;
}
