//! The proposer actor: the "paxos handler" side of a tracker node.
//!
//! It owns everything about the replica's current round: the proposal
//! number, the phase, the reply tally, the value under proposal and the
//! backoff timer. It services one event at a time; outbound RPCs run as
//! short-lived tasks that funnel their replies back into the mailbox,
//! tagged with the proposal number they answer so replies to an abandoned
//! round are discarded.
//!
//! A replica runs at most one round at a time, always for its next unfilled
//! slot. Multiple pending operations serialize through successive slots: a
//! round may decide a value another replica proposed (learned through the
//! highest `accepted_n` promise), in which case the local pending entry
//! stays queued and is retried in the next round.
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::next_proposal;
use crate::config::{Configuration, INITIAL_BACKOFF_UNITS};
use crate::core::pending::PendingQueue;
use crate::core::services::event::Event;
use crate::shared::rpc::messages::{Operation, PrepareReply, Status};
use crate::shared::rpc::node_client::Ring;

/// Events serviced by the proposer actor.
pub enum ProposerEvent {
    /// The event actor admitted a new pending operation.
    Kick,
    /// A prepare answer, tagged with the proposal number it answers.
    PrepareReply { req_n: u64, reply: PrepareReply },
    /// An accept answer, tagged likewise.
    AcceptReply { req_n: u64, status: Status },
    /// This replica finished committing the round's slot. `seq` is the
    /// local log position after the commit, when the commit call got
    /// through.
    Committed { seq: Option<u64> },
    /// The round-expiry timer fired for the tagged round and phase.
    RoundTimeout { req_n: u64, phase: Phase },
    /// Test-time control: park the actor.
    Stall { seconds: u64 },
    Shutdown,
}

/// Where the current round stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Preparing,
    Accepting,
    /// Accept quorum reached, waiting for the local commit to land.
    Committing,
}

/// Proposer-side state of one replica.
pub struct ProposerActor {
    node_id: usize,
    num_nodes: usize,
    ring: Arc<Ring>,
    pending: Arc<PendingQueue>,
    event_tx: mpsc::Sender<Event>,
    self_tx: mpsc::UnboundedSender<ProposerEvent>,

    backoff_base: std::time::Duration,
    backoff_cap_units: u64,
    backoff_units: u64,

    my_n: u64,
    /// Largest proposal number observed anywhere, the base for the next
    /// round's number.
    max_seen: u64,
    /// This replica's view of the next unfilled slot, fed by commit acks
    /// and out-of-date prepare answers.
    seq: u64,
    round_slot: u64,
    phase: Phase,
    oks: usize,
    chosen_n: u64,
    chosen: Option<Operation>,
}

impl ProposerActor {
    #[must_use]
    pub fn new(
        cfg: &Configuration,
        ring: Arc<Ring>,
        pending: Arc<PendingQueue>,
        event_tx: mpsc::Sender<Event>,
        self_tx: mpsc::UnboundedSender<ProposerEvent>,
    ) -> Self {
        Self {
            node_id: cfg.node_id as usize,
            num_nodes: cfg.cluster_size,
            ring,
            pending,
            event_tx,
            self_tx,
            backoff_base: cfg.backoff_base,
            backoff_cap_units: cfg.backoff_cap_units,
            backoff_units: INITIAL_BACKOFF_UNITS,
            my_n: 0,
            max_seen: 0,
            seq: 0,
            round_slot: 0,
            phase: Phase::Idle,
            oks: 0,
            chosen_n: 0,
            chosen: None,
        }
    }

    /// Services the mailbox until shutdown.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ProposerEvent>) {
        while let Some(event) = rx.recv().await {
            if !self.handle(event).await {
                break;
            }
        }
        debug!(node_id = self.node_id, "proposer actor stopped");
    }

    async fn handle(&mut self, event: ProposerEvent) -> bool {
        match event {
            ProposerEvent::Kick => {
                if self.phase == Phase::Idle && !self.pending.is_empty() {
                    self.start_round();
                }
            }
            ProposerEvent::PrepareReply { req_n, reply } => self.on_prepare_reply(req_n, reply),
            ProposerEvent::AcceptReply { req_n, status } => self.on_accept_reply(req_n, status),
            ProposerEvent::Committed { seq } => self.on_committed(seq),
            ProposerEvent::RoundTimeout { req_n, phase } => {
                if req_n == self.my_n && phase == self.phase {
                    debug!(node_id = self.node_id, n = req_n, "round expired, restarting");
                    self.start_round();
                }
            }
            ProposerEvent::Stall { seconds } => {
                // Parking the actor is the point: everything queued behind
                // this event waits out the stall.
                tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;
            }
            ProposerEvent::Shutdown => return false,
        }
        true
    }

    /// Starts (or restarts) a round for the next unfilled slot.
    fn start_round(&mut self) {
        self.my_n = next_proposal(self.max_seen, self.num_nodes as u64, self.node_id as u64);
        self.max_seen = self.my_n;
        self.round_slot = self.seq;
        self.phase = Phase::Preparing;
        self.oks = 0;
        self.chosen_n = 0;
        self.chosen = None;

        self.backoff_units = (2 * (self.backoff_units + self.node_id as u64)).min(self.backoff_cap_units);
        self.arm_timer();

        debug!(
            node_id = self.node_id,
            n = self.my_n,
            slot = self.round_slot,
            "broadcasting prepare"
        );
        for id in 0..self.num_nodes {
            let ring = Arc::clone(&self.ring);
            let tx = self.self_tx.clone();
            let (req_n, slot) = (self.my_n, self.round_slot);
            tokio::spawn(async move {
                let reply = match ring.client(id).prepare(req_n, slot).await {
                    Ok(reply) => reply,
                    // A dead or unreachable node counts as a rejection.
                    Err(_) => PrepareReply {
                        status: Status::Reject,
                        n: 0,
                        op: None,
                        seq: 0,
                    },
                };
                let _ = tx.send(ProposerEvent::PrepareReply { req_n, reply });
            });
        }
    }

    fn on_prepare_reply(&mut self, req_n: u64, reply: PrepareReply) {
        if req_n != self.my_n || self.phase != Phase::Preparing {
            return;
        }
        match reply.status {
            Status::Ok => {
                self.oks += 1;
                if reply.op.is_some() && reply.n > self.chosen_n {
                    self.chosen_n = reply.n;
                    self.chosen = reply.op;
                }
            }
            Status::OutOfDate => {
                // That acceptor already decided this slot; hand the gap to
                // the event actor's catch-up and track the newer sequence.
                self.seq = self.seq.max(reply.seq);
                let event_tx = self.event_tx.clone();
                let target = reply.seq;
                tokio::spawn(async move {
                    let _ = event_tx.send(Event::OutOfDate { target }).await;
                });
            }
            _ => {
                self.max_seen = self.max_seen.max(reply.n);
            }
        }

        if self.oks >= self.majority() {
            if self.chosen.is_none() {
                self.chosen = self.pending.head();
            }
            match self.chosen.clone() {
                None => {
                    // Nothing to decide; end the round idle.
                    self.phase = Phase::Idle;
                }
                Some(op) => {
                    self.oks = 0;
                    self.phase = Phase::Accepting;
                    self.arm_timer();
                    debug!(
                        node_id = self.node_id,
                        n = self.my_n,
                        slot = self.round_slot,
                        torrent = %op.torrent(),
                        "broadcasting accept"
                    );
                    for id in 0..self.num_nodes {
                        let ring = Arc::clone(&self.ring);
                        let tx = self.self_tx.clone();
                        let (req_n, slot, op) = (self.my_n, self.round_slot, op.clone());
                        tokio::spawn(async move {
                            let status = ring
                                .client(id)
                                .accept(req_n, slot, op)
                                .await
                                .unwrap_or(Status::Reject);
                            let _ = tx.send(ProposerEvent::AcceptReply { req_n, status });
                        });
                    }
                }
            }
        }
    }

    fn on_accept_reply(&mut self, req_n: u64, status: Status) {
        if req_n != self.my_n || self.phase != Phase::Accepting {
            return;
        }
        if status == Status::Ok {
            self.oks += 1;
        }
        if self.oks >= self.majority() {
            self.phase = Phase::Committing;
            self.backoff_units = INITIAL_BACKOFF_UNITS;
            let op = self
                .chosen
                .clone()
                .expect("an accept quorum implies a chosen value");
            debug!(
                node_id = self.node_id,
                slot = self.round_slot,
                torrent = %op.torrent(),
                "slot decided, broadcasting commit"
            );
            for id in 0..self.num_nodes {
                let ring = Arc::clone(&self.ring);
                let tx = self.self_tx.clone();
                let (slot, op) = (self.round_slot, op.clone());
                let node_id = self.node_id;
                tokio::spawn(async move {
                    let result = ring.client(id).commit(slot, op).await;
                    // Only the local replica's commit gates the round; the
                    // others learn the value whenever their link allows.
                    if id == node_id {
                        if let Err(ref e) = result {
                            warn!(slot, "local commit call failed: {e}");
                        }
                        let _ = tx.send(ProposerEvent::Committed {
                            seq: result.ok(),
                        });
                    }
                });
            }
        }
    }

    fn on_committed(&mut self, seq: Option<u64>) {
        if let Some(seq) = seq {
            self.seq = self.seq.max(seq);
        }
        if self.phase != Phase::Committing {
            return;
        }
        self.chosen = None;
        if self.pending.is_empty() {
            self.phase = Phase::Idle;
        } else {
            self.start_round();
        }
    }

    fn majority(&self) -> usize {
        self.num_nodes / 2 + 1
    }

    fn arm_timer(&self) {
        let tx = self.self_tx.clone();
        let (req_n, phase) = (self.my_n, self.phase);
        let wait = self
            .backoff_base
            .saturating_mul(u32::try_from(self.backoff_units).unwrap_or(u32::MAX));
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            // Stale timers are discarded by the tag check in the handler.
            let _ = tx.send(ProposerEvent::RoundTimeout { req_n, phase });
        });
    }
}
