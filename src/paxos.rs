//! The Paxos state machine: the proposer phase driver and the four
//! message-kind event handlers (spec.md §4.5). Every function here runs to
//! completion in the single dispatch task (`router.rs`) before the next
//! frame is processed — that serialization is what makes the plain field
//! mutations below safe without any locking.

use crate::{
    codec::MessageKind,
    events::{self, Action},
    proposal::pack,
    router::OutboundFrame,
    state::PeerState,
};
use tokio::sync::mpsc::UnboundedSender;

fn enqueue(
    outbound: &UnboundedSender<OutboundFrame>,
    recipient: &str,
    kind: MessageKind,
    fields: &[i32],
    peer_id: i32,
    value: i32,
    round: i32,
    server_id: i32,
) {
    events::log(peer_id, Action::Sent, kind, value, round, server_id);
    let frame = OutboundFrame {
        recipient: recipient.to_string(),
        bytes: crate::codec::encode(kind, fields),
    };
    // An unbounded channel drained by the same task that enqueues onto it
    // never blocks here; a send error only happens if the dispatch task's
    // receiver has already been dropped, i.e. during shutdown.
    if outbound.send(frame).is_err() {
        debug!("outbound queue closed; dropping {kind} to {recipient}");
    }
}

/// Begin (or restart) the prepare phase: bump the round counter and
/// broadcast PREPARE to every acceptor.
pub fn send_prepare(state: &mut PeerState, outbound: &UnboundedSender<OutboundFrame>) {
    state.round_number += 1;
    state.phase = crate::state::ProposerPhase::Preparing;
    info!(
        "starting prepare phase for round {} with value `{}`",
        state.round_number,
        events::render_value(state.proposal_value)
    );
    for acceptor in state.acceptors.clone() {
        enqueue(
            outbound,
            &acceptor,
            MessageKind::Prepare,
            &[state.round_number, state.server_id, state.proposal_value],
            state.server_id,
            state.proposal_value,
            state.round_number,
            state.server_id,
        );
    }
}

/// Handle an inbound PREPARE from `sender`: update the min-proposal
/// high-water mark and the local round counter, then reply with this
/// acceptor's current accepted proposal/value.
pub fn handle_prepare(
    state: &mut PeerState,
    round: i32,
    server_id: i32,
    value: i32,
    sender: &str,
    outbound: &UnboundedSender<OutboundFrame>,
) {
    events::log(state.server_id, Action::Recv, MessageKind::Prepare, value, round, server_id);

    let n = pack(round, server_id);
    if n > state.min_proposal_number {
        state.min_proposal_number = n;
    }
    if round > state.round_number {
        state.round_number = round;
    }

    let (accepted_round, accepted_server_id) = crate::proposal::unpack(state.accepted_proposal_number);
    enqueue(
        outbound,
        sender,
        MessageKind::PrepareAck,
        &[accepted_round, accepted_server_id, state.accepted_value],
        state.server_id,
        state.accepted_value,
        accepted_round,
        accepted_server_id,
    );
}

/// Handle an inbound PREPARE_ACK: collect it under the proposer's current
/// proposal number, and on reaching quorum (exactly, once), adopt the
/// highest-numbered non-zero accepted value reported and move to the
/// accept phase.
pub fn handle_prepare_ack(
    state: &mut PeerState,
    accepted_round: i32,
    accepted_server_id: i32,
    accepted_value: i32,
    outbound: &UnboundedSender<OutboundFrame>,
) {
    events::log(
        state.server_id,
        Action::Recv,
        MessageKind::PrepareAck,
        accepted_value,
        accepted_round,
        accepted_server_id,
    );

    let n = state.current_proposal_number();
    let acks = state.prepare_acks.entry(n).or_default();
    acks.push((accepted_round, accepted_server_id, accepted_value));

    if acks.len() == state.quorum_size {
        let mut highest = pack(-1, state.server_id);
        for &(round, server_id, value) in acks.iter() {
            let candidate = pack(round, server_id);
            if value != 0 && candidate > highest {
                highest = candidate;
                state.proposal_value = value;
            }
        }
        send_accept(state, outbound);
    }
}

/// Broadcast ACCEPT to every acceptor for the current round and value.
pub fn send_accept(state: &mut PeerState, outbound: &UnboundedSender<OutboundFrame>) {
    state.phase = crate::state::ProposerPhase::Accepting;
    info!(
        "requesting acceptance of value `{}` for round {}",
        events::render_value(state.proposal_value),
        state.round_number
    );
    for acceptor in state.acceptors.clone() {
        enqueue(
            outbound,
            &acceptor,
            MessageKind::Accept,
            &[state.round_number, state.server_id, state.proposal_value],
            state.server_id,
            state.proposal_value,
            state.round_number,
            state.server_id,
        );
    }
}

/// Handle an inbound ACCEPT from `sender`: if its proposal number is at
/// least this acceptor's min-proposal, accept it, then reply with the
/// (possibly just-updated) min-proposal.
pub fn handle_accept(
    state: &mut PeerState,
    round: i32,
    server_id: i32,
    value: i32,
    sender: &str,
    outbound: &UnboundedSender<OutboundFrame>,
) {
    events::log(state.server_id, Action::Recv, MessageKind::Accept, value, round, server_id);

    let n = pack(round, server_id);
    if n >= state.min_proposal_number {
        state.min_proposal_number = n;
        state.accepted_proposal_number = n;
        state.accepted_value = value;
    }

    let (min_round, min_server_id) = crate::proposal::unpack(state.min_proposal_number);
    enqueue(
        outbound,
        sender,
        MessageKind::AcceptAck,
        &[min_round, min_server_id],
        state.server_id,
        state.accepted_value,
        min_round,
        min_server_id,
    );
}

/// Handle an inbound ACCEPT_ACK: collect it, and on reaching quorum
/// (exactly, once), either accept consensus (if every reported min-proposal
/// is at least ours) or restart the prepare phase (if any acceptor admitted
/// a higher proposal number in between).
pub fn handle_accept_ack(
    state: &mut PeerState,
    min_round: i32,
    min_server_id: i32,
    outbound: &UnboundedSender<OutboundFrame>,
) {
    events::log(
        state.server_id,
        Action::Recv,
        MessageKind::AcceptAck,
        state.proposal_value,
        min_round,
        min_server_id,
    );

    let n = state.current_proposal_number();
    let acks = state.accept_acks.entry(n).or_default();
    acks.push((min_round, min_server_id));

    if acks.len() == state.quorum_size {
        let someone_moved_on = acks
            .iter()
            .any(|&(round, server_id)| pack(round, server_id) < n);
        if someone_moved_on {
            info!("quorum reported a higher min-proposal; restarting prepare phase");
            send_prepare(state, outbound);
        } else {
            state.phase = crate::state::ProposerPhase::Done;
            info!(
                "consensus reached on value `{}`",
                events::render_value(state.proposal_value)
            );
        }
    }
}
