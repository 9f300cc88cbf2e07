//! Participant set management.
//!
//! Unlike a stake-weighted validator set, IBFT's participant set is
//! equal-weight: every member counts as exactly one vote, and `f` is a count
//! of participants, not a fraction of stake. This module keeps the same
//! deterministic-ordering discipline as a weighted set — an array indexed by
//! participant id, with a fast pubkey lookup — without the weighting.

use {
    solana_pubkey::Pubkey,
    std::collections::HashMap,
};

/// A single consensus participant: its protocol id and verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub id: u32,
    pub verify_key: Pubkey,
}

/// An ordered, equal-weight set of participants.
///
/// Participant ids are assigned by position (`0..n`) in the order supplied
/// to [`ParticipantSet::new`]; this order must be identical across every
/// participant's local configuration, since `primary_for_round` indexes into
/// it by `round mod n`.
#[derive(Debug, Clone)]
pub struct ParticipantSet {
    participants: Vec<ParticipantInfo>,
    index: HashMap<Pubkey, u32>,
}

impl ParticipantSet {
    /// Build a participant set from an ordered list of verify keys. The
    /// position in `verify_keys` becomes the participant's id.
    pub fn new(verify_keys: Vec<Pubkey>) -> Self {
        let participants: Vec<ParticipantInfo> = verify_keys
            .into_iter()
            .enumerate()
            .map(|(i, verify_key)| ParticipantInfo {
                id: i as u32,
                verify_key,
            })
            .collect();
        let index = participants.iter().map(|p| (p.verify_key, p.id)).collect();
        Self { participants, index }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&ParticipantInfo> {
        self.participants.get(id as usize)
    }

    pub fn id_of(&self, verify_key: &Pubkey) -> Option<u32> {
        self.index.get(verify_key).copied()
    }

    pub fn contains_id(&self, id: u32) -> bool {
        (id as usize) < self.participants.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParticipantInfo> {
        self.participants.iter()
    }
}
