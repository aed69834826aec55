//! Acceptor-side state of the replicated log.
//!
//! One [`Acceptor`] per replica, owned exclusively by the event actor. It
//! tracks the classic single-decree triple (`highest_n`, `accepted_n`,
//! `accepted_v`) for the slot currently being decided, the next slot to
//! apply (`seq`), and the log of every committed value.
//!
//! The acceptor is deliberately pure: it never performs I/O and never
//! applies anything itself. The event actor records commits here and then
//! drains [`Acceptor::take_ready`] to fold values into the metadata state
//! machine in strict slot order, whatever order commits arrived in.
use std::collections::HashMap;

use crate::shared::rpc::messages::Operation;

/// Outcome of a prepare for one slot.
#[derive(Debug)]
pub enum PrepareOutcome {
    /// Promise not to accept lower-numbered proposals; carries the highest
    /// accepted proposal so far, if any.
    Promise {
        accepted_n: u64,
        accepted: Option<Operation>,
        seq: u64,
    },
    /// A higher-numbered proposal was already promised; `highest_n` lets
    /// the rejected proposer outbid it next round.
    Rejected { highest_n: u64 },
    /// The slot was already decided; carries the committed value so the
    /// stale proposer can hand it to its own catch-up.
    OutOfDate { committed: Option<Operation>, seq: u64 },
    /// The proposer is ahead of this replica; reject and catch up to
    /// `target`.
    Behind { target: u64 },
}

/// Outcome of an accept for one slot.
#[derive(Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    Rejected,
    OutOfDate,
    /// The proposer is ahead of this replica; reject and catch up.
    Behind { target: u64 },
}

/// Outcome of a log lookup for another replica's catch-up.
#[derive(Debug, PartialEq)]
pub enum LookupOutcome {
    Committed(Operation),
    /// The slot is below `seq` but absent from the log. Should not happen
    /// once every commit path records its value; the caller treats it as
    /// "try another replica".
    Missing,
    /// The slot has not been decided here yet.
    NotCommitted,
}

/// Acceptor state for the slot at `seq`, plus the committed log.
#[derive(Default)]
pub struct Acceptor {
    highest_n: u64,
    accepted_n: u64,
    accepted: Option<Operation>,
    seq: u64,
    log: HashMap<u64, Operation>,
}

impl Acceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next slot this replica will apply.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Phase one. Only the slot currently being decided can be promised;
    /// past slots answer with their committed value and future slots mean
    /// this replica must catch up first.
    pub fn prepare(&mut self, n: u64, slot: u64) -> PrepareOutcome {
        if slot < self.seq {
            return PrepareOutcome::OutOfDate {
                committed: self.log.get(&slot).cloned(),
                seq: self.seq,
            };
        }
        if slot > self.seq {
            return PrepareOutcome::Behind { target: slot };
        }
        if n < self.highest_n {
            return PrepareOutcome::Rejected {
                highest_n: self.highest_n,
            };
        }
        self.highest_n = n;
        PrepareOutcome::Promise {
            accepted_n: self.accepted_n,
            accepted: self.accepted.clone(),
            seq: self.seq,
        }
    }

    /// Phase two, same out-of-range rules as [`Acceptor::prepare`].
    pub fn accept(&mut self, n: u64, slot: u64, op: Operation) -> AcceptOutcome {
        if slot < self.seq {
            return AcceptOutcome::OutOfDate;
        }
        if slot > self.seq {
            return AcceptOutcome::Behind { target: slot };
        }
        if n < self.highest_n {
            return AcceptOutcome::Rejected;
        }
        self.highest_n = n;
        self.accepted_n = n;
        self.accepted = Some(op);
        AcceptOutcome::Accepted
    }

    /// Records a decided value. Every commit path goes through here,
    /// catch-up included, so the log never has holes below `seq`.
    pub fn record(&mut self, slot: u64, op: Operation) {
        self.log.insert(slot, op);
    }

    /// Pops the value for the current slot if it has been recorded,
    /// advancing `seq` and resetting the accepted pair, which belongs to
    /// the next slot. Callers loop on this to drain contiguous commits
    /// that arrived out of order.
    pub fn take_ready(&mut self) -> Option<Operation> {
        let op = self.log.get(&self.seq).cloned()?;
        self.seq += 1;
        self.accepted_n = 0;
        self.accepted = None;
        Some(op)
    }

    /// Serves another replica's catch-up.
    #[must_use]
    pub fn lookup(&self, slot: u64) -> LookupOutcome {
        if slot >= self.seq {
            return LookupOutcome::NotCommitted;
        }
        match self.log.get(&slot) {
            Some(op) => LookupOutcome::Committed(op.clone()),
            None => LookupOutcome::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{AcceptOutcome, Acceptor, LookupOutcome, PrepareOutcome};
    use crate::shared::bit_torrent::info_hash::InfoHash;
    use crate::shared::bit_torrent::metainfo::{ChunkId, Metainfo, TorrentId};
    use crate::shared::rpc::messages::Operation;

    fn op(tag: &str) -> Operation {
        Operation::Create {
            metainfo: Metainfo {
                id: TorrentId {
                    name: tag.to_owned(),
                    info_hash: InfoHash::of(tag.as_bytes()),
                },
                tracker_nodes: vec![],
                chunk_hashes: BTreeMap::new(),
                chunk_size: 1,
                file_size: 1,
            },
        }
    }

    fn add(peer: &str) -> Operation {
        Operation::Add {
            chunk: ChunkId {
                torrent: TorrentId {
                    name: "movie".to_owned(),
                    info_hash: InfoHash::of(b"movie"),
                },
                index: 0,
            },
            peer: peer.to_owned(),
        }
    }

    #[test]
    fn should_promise_a_first_prepare_and_report_no_accepted_value() {
        let mut acceptor = Acceptor::new();

        let outcome = acceptor.prepare(3, 0);

        assert!(matches!(
            outcome,
            PrepareOutcome::Promise {
                accepted_n: 0,
                accepted: None,
                seq: 0
            }
        ));
    }

    #[test]
    fn should_reject_a_prepare_below_an_earlier_promise() {
        let mut acceptor = Acceptor::new();
        let _ = acceptor.prepare(7, 0);

        let outcome = acceptor.prepare(3, 0);

        assert!(matches!(outcome, PrepareOutcome::Rejected { highest_n: 7 }));
    }

    #[test]
    fn should_hand_a_newer_prepare_the_previously_accepted_value() {
        let mut acceptor = Acceptor::new();
        assert_eq!(acceptor.accept(3, 0, add("banana")), AcceptOutcome::Accepted);

        let outcome = acceptor.prepare(9, 0);

        match outcome {
            PrepareOutcome::Promise {
                accepted_n,
                accepted,
                ..
            } => {
                assert_eq!(accepted_n, 3);
                assert_eq!(accepted, Some(add("banana")));
            }
            other => panic!("expected a promise, got {other:?}"),
        }
    }

    #[test]
    fn should_reject_an_accept_below_the_promised_number() {
        let mut acceptor = Acceptor::new();
        let _ = acceptor.prepare(8, 0);

        assert_eq!(acceptor.accept(5, 0, add("banana")), AcceptOutcome::Rejected);
    }

    #[test]
    fn should_answer_out_of_date_with_the_committed_value_for_a_past_slot() {
        let mut acceptor = Acceptor::new();
        acceptor.record(0, op("movie"));
        assert!(acceptor.take_ready().is_some());

        let outcome = acceptor.prepare(4, 0);

        match outcome {
            PrepareOutcome::OutOfDate { committed, seq } => {
                assert_eq!(committed, Some(op("movie")));
                assert_eq!(seq, 1);
            }
            other => panic!("expected out-of-date, got {other:?}"),
        }
    }

    #[test]
    fn should_flag_a_prepare_for_a_future_slot_as_behind() {
        let mut acceptor = Acceptor::new();

        let outcome = acceptor.prepare(4, 5);

        assert!(matches!(outcome, PrepareOutcome::Behind { target: 5 }));
    }

    #[test]
    fn should_flag_an_accept_for_a_future_slot_as_behind() {
        let mut acceptor = Acceptor::new();

        let outcome = acceptor.accept(4, 5, add("banana"));

        assert_eq!(outcome, AcceptOutcome::Behind { target: 5 });
    }

    #[test]
    fn should_drain_out_of_order_commits_in_slot_order() {
        let mut acceptor = Acceptor::new();
        acceptor.record(1, op("second"));
        assert!(acceptor.take_ready().is_none());

        acceptor.record(0, op("first"));

        assert_eq!(acceptor.take_ready(), Some(op("first")));
        assert_eq!(acceptor.take_ready(), Some(op("second")));
        assert!(acceptor.take_ready().is_none());
        assert_eq!(acceptor.seq(), 2);
    }

    #[test]
    fn should_reset_the_accepted_pair_when_a_slot_is_applied() {
        let mut acceptor = Acceptor::new();
        assert_eq!(acceptor.accept(3, 0, add("banana")), AcceptOutcome::Accepted);
        acceptor.record(0, add("banana"));
        assert!(acceptor.take_ready().is_some());

        let outcome = acceptor.prepare(10, 1);

        assert!(matches!(
            outcome,
            PrepareOutcome::Promise {
                accepted_n: 0,
                accepted: None,
                seq: 1
            }
        ));
    }

    #[test]
    fn should_serve_committed_slots_to_catch_up_lookups() {
        let mut acceptor = Acceptor::new();
        acceptor.record(0, op("movie"));
        assert!(acceptor.take_ready().is_some());

        assert_eq!(acceptor.lookup(0), LookupOutcome::Committed(op("movie")));
        assert_eq!(acceptor.lookup(1), LookupOutcome::NotCommitted);
    }
}
