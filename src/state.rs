//! The per-peer consensus variables, owned exclusively by the dispatch task
//! (see `router.rs`): a single-threaded owner is the concurrency-safety
//! guarantee for everything in this module, so nothing here needs a lock.

use crate::proposal::{pack, ProposalNumber};
use std::collections::HashMap;

/// A prepare-ack entry collected by a proposer while in `PREPARING`:
/// `(accepted_round, accepted_server_id, accepted_value)` as reported by
/// one acceptor.
pub type PrepareAckEntry = (i32, i32, i32);

/// An accept-ack entry collected by a proposer while in `ACCEPTING`:
/// `(min_round, min_server_id)` as reported by one acceptor.
pub type AcceptAckEntry = (i32, i32);

/// The high-level lifecycle state of the proposer half of a peer. Acceptors
/// have no analogous state machine: every PREPARE/ACCEPT is handled
/// statelessly against the fields below.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProposerPhase {
    Idle,
    Preparing,
    Accepting,
    Done,
}

/// All consensus state for one peer: the acceptor's promise/accept bookkeeping,
/// the proposer's round counter and quorum tables, and the static
/// configuration each peer is born with.
pub struct PeerState {
    /// Assigned by position in the hosts manifest, 1-based. Immutable after
    /// startup.
    pub server_id: i32,

    /// Proposer-local next round counter. Starts at -1; incremented by 1 at
    /// the start of every prepare phase.
    pub round_number: i32,

    /// Acceptor's high-water mark: the largest proposal number this
    /// acceptor has promised or accepted.
    pub min_proposal_number: i64,

    /// The proposal number under which `accepted_value` was last accepted.
    pub accepted_proposal_number: i64,

    /// The value most recently accepted by this acceptor. 0 means "no value
    /// yet accepted".
    pub accepted_value: i32,

    /// The value this proposer will push. Set from configuration at
    /// construction; may be overwritten during prepare-phase adoption.
    pub proposal_value: i32,

    /// The proposer group this peer participates in, or `NOT_A_PROPOSER` if
    /// this peer has no proposer role.
    pub proposer_id: i64,

    /// Immutable list of hostnames to target with PREPARE/ACCEPT.
    pub acceptors: Vec<String>,

    /// `acceptors.len()`. A quorum requires equality to this count
    /// (unanimity, not a majority).
    pub quorum_size: usize,

    /// Prepare-acks collected so far, keyed by the proposer's current
    /// packed proposal number.
    pub prepare_acks: HashMap<i64, Vec<PrepareAckEntry>>,

    /// Accept-acks collected so far, keyed by the proposer's current packed
    /// proposal number.
    pub accept_acks: HashMap<i64, Vec<AcceptAckEntry>>,

    /// Tracked only for observability/tests; the handlers derive behavior
    /// from the quorum tables, not from this field, but it mirrors the
    /// conceptual state machine in spec.md.
    pub phase: ProposerPhase,
}

impl PeerState {
    #[must_use]
    pub fn new(server_id: i32, proposer_id: i64, acceptors: Vec<String>, proposal_value: i32) -> Self {
        let unset = pack(-1, server_id);
        let quorum_size = acceptors.len();
        Self {
            server_id,
            round_number: -1,
            min_proposal_number: unset,
            accepted_proposal_number: unset,
            accepted_value: 0,
            proposal_value,
            proposer_id,
            acceptors,
            quorum_size,
            prepare_acks: HashMap::new(),
            accept_acks: HashMap::new(),
            phase: ProposerPhase::Idle,
        }
    }

    #[must_use]
    pub fn is_proposer(&self) -> bool {
        self.proposer_id != crate::hosts::NOT_A_PROPOSER
    }

    /// The proposer's current proposal number, `pack(round_number, self)`.
    #[must_use]
    pub fn current_proposal_number(&self) -> i64 {
        pack(self.round_number, self.server_id)
    }

    /// Check invariant 1: `min_proposal_number >= accepted_proposal_number`.
    #[must_use]
    pub fn acceptor_invariant_holds(&self) -> bool {
        ProposalNumber(self.min_proposal_number) >= ProposalNumber(self.accepted_proposal_number)
    }
}

#[cfg(test)]
mod tests {
    use super::{PeerState, ProposerPhase};
    use crate::proposal::pack;

    #[test]
    fn initial_state_matches_spec_sentinels() {
        let state = PeerState::new(3, -1, vec!["a1".into(), "a2".into()], 0);
        assert_eq!(state.round_number, -1);
        assert_eq!(state.min_proposal_number, pack(-1, 3));
        assert_eq!(state.accepted_proposal_number, pack(-1, 3));
        assert_eq!(state.accepted_value, 0);
        assert_eq!(state.quorum_size, 2);
        assert!(!state.is_proposer());
        assert_eq!(state.phase, ProposerPhase::Idle);
    }

    #[test]
    fn acceptor_invariant_holds_initially() {
        let state = PeerState::new(1, -1, vec![], 0);
        assert!(state.acceptor_invariant_holds());
    }
}
