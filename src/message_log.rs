//! Per-participant message log: indexed, deduplicated storage of received
//! messages keyed by (view, sequence[, value]).
//!
//! The reference protocol describes three-level dictionaries
//! (`(view, seq) -> value -> set<sender>`); per the flattening guidance,
//! this log uses flat `HashMap`s keyed by a `(view, sequence, value_digest)`
//! struct so insertion is O(1) amortized and there is no nested-map
//! bookkeeping.

use {
    crate::{
        crypto::Digest,
        types::{Message, MessageKind},
    },
    std::collections::{HashMap, HashSet},
};

/// Key for vote-style indices: (view, sequence, digest of the voted value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ValueKey {
    view: u64,
    sequence: u64,
    value_digest: Digest,
}

/// Key for PRE-PREPARE storage: at most one per (view, sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ViewSeqKey {
    view: u64,
    sequence: u64,
}

fn value_digest(value: &Option<Vec<u8>>) -> Digest {
    crate::crypto::digest(value.as_deref().unwrap_or(&[]))
}

/// Indexed, deduplicated storage of messages seen by one participant.
#[derive(Debug, Default)]
pub struct MessageLog {
    preprepare: HashMap<ViewSeqKey, Message>,
    prepare: HashMap<ValueKey, HashMap<u32, Message>>,
    commit: HashMap<ValueKey, HashMap<u32, Message>>,
    round_change: HashMap<u64, HashMap<u32, Message>>,
    new_round: HashMap<u64, Message>,
    seen_digests: HashSet<Digest>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `msg` under its appropriate index. Returns `true` if this is
    /// the first time this digest was seen (a genuinely new message),
    /// `false` for a duplicate (no-op).
    pub fn record(&mut self, msg: Message) -> bool {
        let digest = msg.digest();
        if !self.seen_digests.insert(digest) {
            return false;
        }

        match msg.kind {
            MessageKind::PrePrepare => {
                let key = ViewSeqKey {
                    view: msg.view,
                    sequence: msg.sequence,
                };
                self.preprepare.entry(key).or_insert(msg);
            }
            MessageKind::Prepare => {
                let key = ValueKey {
                    view: msg.view,
                    sequence: msg.sequence,
                    value_digest: value_digest(&msg.value),
                };
                self.prepare
                    .entry(key)
                    .or_default()
                    .insert(msg.sender, msg);
            }
            MessageKind::Commit => {
                let key = ValueKey {
                    view: msg.view,
                    sequence: msg.sequence,
                    value_digest: value_digest(&msg.value),
                };
                self.commit
                    .entry(key)
                    .or_default()
                    .insert(msg.sender, msg);
            }
            MessageKind::RoundChange => {
                self.round_change
                    .entry(msg.view)
                    .or_default()
                    .insert(msg.sender, msg);
            }
            MessageKind::NewRound => {
                self.new_round.entry(msg.view).or_insert(msg);
            }
        }
        true
    }

    pub fn has_preprepare(&self, view: u64, sequence: u64) -> bool {
        self.preprepare
            .contains_key(&ViewSeqKey { view, sequence })
    }

    pub fn preprepare(&self, view: u64, sequence: u64) -> Option<&Message> {
        self.preprepare.get(&ViewSeqKey { view, sequence })
    }

    /// Senders who have sent a PREPARE for (view, sequence, value).
    pub fn prepare_senders(&self, view: u64, sequence: u64, value: &Option<Vec<u8>>) -> Vec<u32> {
        let key = ValueKey {
            view,
            sequence,
            value_digest: value_digest(value),
        };
        self.prepare
            .get(&key)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn prepare_messages(&self, view: u64, sequence: u64, value: &Option<Vec<u8>>) -> Vec<&Message> {
        let key = ValueKey {
            view,
            sequence,
            value_digest: value_digest(value),
        };
        self.prepare
            .get(&key)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    /// Senders who have sent a COMMIT for (view, sequence, value).
    pub fn commit_senders(&self, view: u64, sequence: u64, value: &Option<Vec<u8>>) -> Vec<u32> {
        let key = ValueKey {
            view,
            sequence,
            value_digest: value_digest(value),
        };
        self.commit
            .get(&key)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn commit_messages(&self, view: u64, sequence: u64, value: &Option<Vec<u8>>) -> Vec<&Message> {
        let key = ValueKey {
            view,
            sequence,
            value_digest: value_digest(value),
        };
        self.commit
            .get(&key)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    /// All rounds for which at least one ROUND-CHANGE has been recorded.
    pub fn round_change_rounds(&self) -> Vec<u64> {
        self.round_change.keys().copied().collect()
    }

    pub fn round_change_senders(&self, view: u64) -> Vec<u32> {
        self.round_change
            .get(&view)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn round_change_messages(&self, view: u64) -> Vec<&Message> {
        self.round_change
            .get(&view)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    pub fn has_new_round(&self, view: u64) -> bool {
        self.new_round.contains_key(&view)
    }

    /// Drop every entry whose sequence is older than `min_sequence`.
    pub fn gc_below(&mut self, min_sequence: u64) {
        self.preprepare.retain(|k, _| k.sequence >= min_sequence);
        self.prepare.retain(|k, _| k.sequence >= min_sequence);
        self.commit.retain(|k, _| k.sequence >= min_sequence);
        // round_change/new_round are keyed by view, not sequence; they are
        // cleared wholesale on instance advance by the participant state
        // machine instead (views restart at 0 per instance).
    }

    /// Clear per-view indices, called when a consensus instance decides and
    /// the next instance's round starts at 0.
    pub fn clear_round_change_and_new_round(&mut self) {
        self.round_change.clear();
        self.new_round.clear();
    }
}
