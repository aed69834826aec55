//! The event actor: sole owner of the acceptor state, the applied metadata
//! and the pending-reply fan-out.
//!
//! It services exactly one inbound message at a time: admission requests
//! from clients, Paxos acceptor traffic from other cluster members,
//! catch-up triggers and reads. Request workers hand it a message with a
//! reply channel and wait; mutations admitted here are parked in the
//! pending queue until the commit that satisfies them is applied, at which
//! point the sweep answers the caller.
//!
//! Catch-up runs inside this actor: while the replica is pulling missed
//! slots from its peers it answers nothing else, which is exactly the
//! "stop validating updates while out of date" behaviour the protocol
//! wants.
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::core::error::Error;
use crate::core::metadata::Metadata;
use crate::core::paxos::acceptor::{AcceptOutcome, Acceptor, LookupOutcome, PrepareOutcome};
use crate::core::paxos::proposer::ProposerEvent;
use crate::core::pending::{PendingQueue, UpdateTx};
use crate::shared::bit_torrent::metainfo::{ChunkHash, ChunkId, Metainfo};
use crate::shared::rpc::messages::{NodeInfo, Operation, PrepareReply, Status};
use crate::shared::rpc::node_client::Ring;

/// Messages serviced by the event actor.
pub enum Event {
    /// Registration after bootstrap has completed: always answered with the
    /// full node list.
    Register {
        info: NodeInfo,
        reply: oneshot::Sender<(Status, Vec<NodeInfo>)>,
    },
    Prepare {
        n: u64,
        slot: u64,
        reply: oneshot::Sender<PrepareReply>,
    },
    Accept {
        n: u64,
        slot: u64,
        op: Operation,
        reply: oneshot::Sender<Status>,
    },
    /// Replies with the sequence number after the commit is recorded (and,
    /// when it filled the current slot, applied).
    Commit {
        slot: u64,
        op: Operation,
        reply: oneshot::Sender<u64>,
    },
    GetOp {
        slot: u64,
        reply: oneshot::Sender<(Status, Option<Operation>)>,
    },
    Create {
        metainfo: Metainfo,
        reply: UpdateTx,
    },
    Confirm {
        chunk: ChunkId,
        peer: String,
        reply: UpdateTx,
    },
    Report {
        chunk: ChunkId,
        peer: String,
        reply: UpdateTx,
    },
    Request {
        chunk: ChunkId,
        reply: oneshot::Sender<Result<(Vec<String>, ChunkHash), Error>>,
    },
    GetTrackers {
        reply: oneshot::Sender<Vec<String>>,
    },
    /// This replica observed traffic for a slot beyond its own log; pull
    /// the gap from its peers.
    OutOfDate { target: u64 },
    /// Test-time control: park the actor.
    Stall { seconds: u64 },
    Shutdown,
}

/// The state the event actor owns.
pub struct EventActor {
    node_id: usize,
    ring: Arc<Ring>,
    acceptor: Acceptor,
    metadata: Metadata,
    pending: Arc<PendingQueue>,
    self_tx: mpsc::Sender<Event>,
    proposer_tx: mpsc::UnboundedSender<ProposerEvent>,
}

impl EventActor {
    #[must_use]
    pub fn new(
        cfg: &Configuration,
        ring: Arc<Ring>,
        pending: Arc<PendingQueue>,
        self_tx: mpsc::Sender<Event>,
        proposer_tx: mpsc::UnboundedSender<ProposerEvent>,
    ) -> Self {
        Self {
            node_id: cfg.node_id as usize,
            ring,
            acceptor: Acceptor::new(),
            metadata: Metadata::new(),
            pending,
            self_tx,
            proposer_tx,
        }
    }

    /// Services `stashed` (messages that arrived during bootstrap) and then
    /// the mailbox until shutdown.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Event>, stashed: Vec<Event>) {
        for event in stashed {
            if !self.handle(event).await {
                return;
            }
        }
        while let Some(event) = rx.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
        debug!(node_id = self.node_id, "event actor stopped");
    }

    async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Register { info, reply } => {
                debug!(node_id = self.node_id, from = info.node_id, "late registration");
                let _ = reply.send((Status::Ok, self.ring.nodes().to_vec()));
            }
            Event::Prepare { n, slot, reply } => {
                let wire = match self.acceptor.prepare(n, slot) {
                    PrepareOutcome::Promise {
                        accepted_n,
                        accepted,
                        seq,
                    } => PrepareReply {
                        status: Status::Ok,
                        n: accepted_n,
                        op: accepted,
                        seq,
                    },
                    PrepareOutcome::Rejected { highest_n } => PrepareReply {
                        status: Status::Reject,
                        n: highest_n,
                        op: None,
                        seq: self.acceptor.seq(),
                    },
                    PrepareOutcome::OutOfDate { committed, seq } => PrepareReply {
                        status: Status::OutOfDate,
                        n: 0,
                        op: committed,
                        seq,
                    },
                    PrepareOutcome::Behind { target } => {
                        // A proposer ahead of us means committed slots we
                        // missed; this replica should not be validating
                        // updates until it has them.
                        self.trigger_catch_up(target);
                        PrepareReply {
                            status: Status::Reject,
                            n: 0,
                            op: None,
                            seq: self.acceptor.seq(),
                        }
                    }
                };
                let _ = reply.send(wire);
            }
            Event::Accept { n, slot, op, reply } => {
                let status = match self.acceptor.accept(n, slot, op) {
                    AcceptOutcome::Accepted => Status::Ok,
                    AcceptOutcome::Rejected => Status::Reject,
                    AcceptOutcome::OutOfDate => Status::OutOfDate,
                    AcceptOutcome::Behind { target } => {
                        self.trigger_catch_up(target);
                        Status::Reject
                    }
                };
                let _ = reply.send(status);
            }
            Event::Commit { slot, op, reply } => {
                self.acceptor.record(slot, op);
                self.drain_ready();
                let _ = reply.send(self.acceptor.seq());
            }
            Event::GetOp { slot, reply } => {
                let answer = match self.acceptor.lookup(slot) {
                    LookupOutcome::Committed(op) => (Status::Ok, Some(op)),
                    LookupOutcome::Missing => (Status::Reject, None),
                    LookupOutcome::NotCommitted => (Status::OutOfDate, None),
                };
                let _ = reply.send(answer);
            }
            Event::Create { metainfo, reply } => {
                match self.metadata.check_create(&metainfo, &self.ring.host_ports()) {
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                    Ok(()) => self.enqueue(Operation::Create { metainfo }, reply),
                }
            }
            Event::Confirm { chunk, peer, reply } => match self.metadata.check_chunk(&chunk) {
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
                Ok(_) => self.enqueue(Operation::Add { chunk, peer }, reply),
            },
            Event::Report { chunk, peer, reply } => match self.metadata.check_chunk(&chunk) {
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
                Ok(_) => self.enqueue(Operation::Delete { chunk, peer }, reply),
            },
            Event::Request { chunk, reply } => {
                let answer = match self.metadata.check_chunk(&chunk) {
                    Err(e) => Err(e),
                    Ok(metainfo) => {
                        let hash = metainfo
                            .chunk_hash(chunk.index)
                            .expect("in-range chunks have a hash");
                        Ok((self.metadata.peers_with(&chunk), hash))
                    }
                };
                let _ = reply.send(answer);
            }
            Event::GetTrackers { reply } => {
                let _ = reply.send(self.ring.host_ports());
            }
            Event::OutOfDate { target } => self.catch_up(target).await,
            Event::Stall { seconds } => {
                tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
            }
            Event::Shutdown => return false,
        }
        true
    }

    /// Parks an admitted mutation until its commit and pokes the proposer.
    fn enqueue(&self, op: Operation, reply: UpdateTx) {
        self.pending.push(op, reply);
        let _ = self.proposer_tx.send(ProposerEvent::Kick);
    }

    /// Applies every contiguous slot the log already holds, sweeping the
    /// pending queue after each one. Out-of-order commit arrivals drain
    /// here in index order.
    fn drain_ready(&mut self) {
        while let Some(op) = self.acceptor.take_ready() {
            self.metadata.apply(&op);
            let settled = self.pending.sweep(&op);
            debug!(
                node_id = self.node_id,
                slot = self.acceptor.seq() - 1,
                settled,
                torrent = %op.torrent(),
                "applied committed operation"
            );
        }
    }

    // Queued through the mailbox rather than run inline so the actor never
    // waits on itself while it still holds the current message's reply.
    fn trigger_catch_up(&self, target: u64) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(Event::OutOfDate { target }).await;
        });
    }

    /// Pulls missed slots from peers, round-robin starting at the next
    /// node, until the target is reached, a full loop makes no progress,
    /// or a peer answers that nothing newer is committed anywhere.
    async fn catch_up(&mut self, mut target: u64) {
        let nodes = self.ring.len();
        if nodes == 1 {
            return;
        }
        let mut current = (self.node_id + 1) % nodes;
        while self.acceptor.seq() < target {
            let slot = self.acceptor.seq();
            match self.ring.client(current).get_op(slot).await {
                Ok((Status::Ok, Some(op))) => {
                    self.acceptor.record(slot, op);
                    self.drain_ready();
                }
                Ok((Status::OutOfDate, _)) => {
                    // That peer is ahead of us only on its own pending
                    // operations, not on committed state.
                    break;
                }
                Ok(_) | Err(_) => {
                    current = (current + 1) % nodes;
                    if current == self.node_id {
                        // Looped the whole ring without progress; the
                        // target was too ambitious.
                        warn!(node_id = self.node_id, slot, "catch-up made no progress");
                        target = self.acceptor.seq();
                    }
                }
            }
        }
    }
}
