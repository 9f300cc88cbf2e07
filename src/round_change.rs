//! ROUND-CHANGE / NEW-ROUND: the view-change subprotocol that carries a
//! stalled instance from one round to the next without losing a value any
//! participant may already have prepared.
//!
//! Two triggers enter round `r+1`: this participant's own round timer
//! firing, or observing `f+1` ROUND-CHANGEs for some round ahead of the
//! current one (the catch-up jump — a signal that this participant is
//! behind, since `f+1` round-changes can only appear once at least one
//! honest participant has moved on).

use crate::{
    certificate,
    config::BftConfig,
    message_log::MessageLog,
    types::{Message, MessageKind},
};

/// Build this participant's own ROUND-CHANGE for `target_round`, carrying
/// `prepared_justification` (the sub-messages of its current prepared
/// certificate, or empty if it never prepared in this instance — see
/// [`crate::engine::ConsensusEngine::prepared_justification`]).
pub fn build_round_change(
    id: u32,
    signing_key: &solana_keypair::Keypair,
    sequence: u64,
    target_round: u64,
    prepared_justification: Vec<Message>,
) -> Message {
    let mut msg = Message::build(
        MessageKind::RoundChange,
        target_round,
        sequence,
        id,
        None,
        prepared_justification,
    );
    msg.sign(signing_key);
    msg
}

/// Whether a quorum (`2f+1`) of ROUND-CHANGE messages for `round` has been
/// recorded.
pub fn round_change_quorum_reached(config: &BftConfig, log: &MessageLog, round: u64) -> bool {
    log.round_change_senders(round).len() >= config.quorum() as usize
}

/// The f+1 catch-up rule: if `f+1` distinct participants have sent a
/// ROUND-CHANGE for some round strictly ahead of `current_round`, this
/// participant should jump directly to the lowest such round (skipping its
/// own timeout) rather than wait. Returns `None` if no such round exists.
pub fn catchup_jump_round(config: &BftConfig, log: &MessageLog, current_round: u64) -> Option<u64> {
    let f_plus_one = config.f as usize + 1;
    log.round_change_rounds()
        .into_iter()
        .filter(|&round| round > current_round)
        .filter(|&round| log.round_change_senders(round).len() >= f_plus_one)
        .min()
}

/// Build the NEW-ROUND message a primary broadcasts once it has collected a
/// quorum of ROUND-CHANGEs for the round it is about to lead. Carries the
/// round-changes (and any prepared-certificates they hold) as justification
/// for the PRE-PREPARE that follows it.
pub fn build_new_round(
    id: u32,
    signing_key: &solana_keypair::Keypair,
    sequence: u64,
    round: u64,
    round_changes: Vec<Message>,
) -> Message {
    let mut msg = Message::build(MessageKind::NewRound, round, sequence, id, None, round_changes);
    msg.sign(signing_key);
    msg
}

/// Safe-Value Selection (component 5, continued in [`crate::certificate`]):
/// the value the new primary must re-propose. If some round-change carries
/// a prepared-certificate, its value is mandatory; only when nobody
/// prepared is the primary free to propose `own_candidate`.
pub fn select_value_to_repropose(
    round_changes: &[Message],
    own_candidate: Vec<u8>,
) -> Vec<u8> {
    certificate::select_safe_value(round_changes).unwrap_or(own_candidate)
}
