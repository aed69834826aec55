//! The replicated log: one single-decree Paxos instance per slot, sequenced
//! by `seq_num`.
//!
//! Every replica plays all three roles. The acceptor side lives in
//! [`acceptor`] and is owned by the event actor; the proposer side lives in
//! [`proposer`] and is its own actor. Learning is the commit broadcast: the
//! proposer that wins a slot tells every replica, and replicas that missed
//! it recover through catch-up (driven by the event actor).
//!
//! Proposal numbers are globally unique and per-replica monotonic: replica
//! `i` of an `N`-node cluster only ever issues numbers `≡ i (mod N)`, and
//! each new one jumps above everything the replica has observed.
pub mod acceptor;
pub mod proposer;

/// The next proposal number for `node_id`, strictly above `highest_seen`.
#[must_use]
pub fn next_proposal(highest_seen: u64, num_nodes: u64, node_id: u64) -> u64 {
    ((highest_seen / num_nodes) + 1) * num_nodes + node_id
}

#[cfg(test)]
mod tests {
    use super::next_proposal;

    #[test]
    fn should_keep_proposal_numbers_congruent_to_the_node_id() {
        for node_id in 0..5 {
            let n = next_proposal(17, 5, node_id);

            assert_eq!(n % 5, node_id);
        }
    }

    #[test]
    fn should_always_exceed_the_highest_observed_number() {
        for highest in [0, 1, 4, 5, 99, 100] {
            for node_id in 0..3 {
                assert!(next_proposal(highest, 3, node_id) > highest);
            }
        }
    }

    #[test]
    fn should_grow_monotonically_per_replica() {
        let first = next_proposal(0, 3, 1);
        let second = next_proposal(first, 3, 1);

        assert!(second > first);
    }
}
