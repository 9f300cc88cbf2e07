//! The core IBFT consensus state machine: PRE-PREPARE, PREPARE, and COMMIT
//! reception and emission for a single consensus instance.
//!
//! ROUND-CHANGE/NEW-ROUND handling lives in [`crate::round_change`]; this
//! module only implements the three-phase happy path, assuming the caller
//! (the single-writer participant facade) has already verified the top-level
//! message signature, deduplicated it, and confirmed it belongs to the
//! instance currently open.
//!
//! The engine is deterministic: given the same sequence of accepted
//! messages, it always produces the same state transitions and outputs.
//! All I/O is external; this module is pure state-machine logic.

use {
    crate::{
        application::ExternalValidity,
        certificate::{self, CommitCertificate},
        config::BftConfig,
        error::ConsensusError,
        message_log::MessageLog,
        participant_set::ParticipantSet,
        types::{Message, MessageKind},
    },
    log::*,
    solana_keypair::Keypair,
};

/// Messages (and a decision, if reached) produced by processing one event.
#[derive(Debug, Default, PartialEq)]
pub struct EngineOutput {
    pub messages: Vec<Message>,
    pub decided: Option<Vec<u8>>,
}

impl EngineOutput {
    fn empty() -> Self {
        Self::default()
    }

    fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            decided: None,
        }
    }

    fn with_decision(value: Vec<u8>) -> Self {
        Self {
            messages: Vec::new(),
            decided: Some(value),
        }
    }
}

/// Per-instance consensus variables: λ is implicit (the engine only ever
/// tracks one open instance at a time; the participant facade advances
/// `sequence` and rebuilds the engine between instances).
#[derive(Debug, Clone, Default)]
struct InstanceState {
    sequence: u64,
    round: u64,
    /// Highest round at which this participant prepared a value (`pr`).
    prepared_round: Option<u64>,
    /// The value prepared at `prepared_round` (`pv`).
    prepared_value: Option<Vec<u8>>,
    decided: bool,
    /// The value and view this instance decided under. Set independently of
    /// `prepared_value`/`prepared_round`: a participant may decide purely
    /// from a COMMIT-quorum without ever having observed the matching
    /// PRE-PREPARE or PREPARE-quorum itself (the catch-up case).
    decided_value: Option<Vec<u8>>,
    decided_view: u64,
    sent_prepare_for_round: Option<u64>,
    sent_commit_for_round: Option<u64>,
}

/// The IBFT consensus engine for one participant's view of one instance.
pub struct ConsensusEngine {
    config: BftConfig,
    id: u32,
    signing_key: Keypair,
    participants: ParticipantSet,
    state: InstanceState,
    log: MessageLog,
}

impl ConsensusEngine {
    pub fn new(config: BftConfig, id: u32, signing_key: Keypair, participants: ParticipantSet) -> Self {
        Self {
            config,
            id,
            signing_key,
            participants,
            state: InstanceState::default(),
            log: MessageLog::new(),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.state.sequence
    }

    pub fn round(&self) -> u64 {
        self.state.round
    }

    pub fn is_decided(&self) -> bool {
        self.state.decided
    }

    pub fn prepared(&self) -> Option<(u64, &[u8])> {
        match (self.state.prepared_round, &self.state.prepared_value) {
            (Some(r), Some(v)) => Some((r, v.as_slice())),
            _ => None,
        }
    }

    /// Reset to a fresh instance at `sequence`, round 0, with no prepared
    /// state. Called by the participant facade after a decision.
    ///
    /// The message log is not wiped: PRE-PREPARE/PREPARE/COMMIT entries for
    /// the last `gc_window` instances are retained (so a late-joining or
    /// catching-up peer can still be served a commit-certificate for a
    /// recently decided sequence), and only entries older than that window
    /// are evicted. Per-view ROUND-CHANGE/NEW-ROUND entries are always
    /// cleared — rounds restart at 0 for the new instance, so stale entries
    /// there would otherwise collide with the new instance's own.
    pub fn reset_for_sequence(&mut self, sequence: u64) {
        self.state = InstanceState {
            sequence,
            ..InstanceState::default()
        };
        self.log.clear_round_change_and_new_round();
        self.log
            .gc_below(sequence.saturating_sub(self.config.gc_window));
    }

    /// Advance to `round` within the current instance. `prepared_round` and
    /// `prepared_value` are not cleared: they persist across rounds, backing
    /// the safe-value-selection lock.
    pub fn advance_round(&mut self, round: u64) {
        self.state.round = round;
    }

    /// Build this participant's own PRE-PREPARE for `round`, as primary.
    /// `justification` is empty for round 0 and a quorum of ROUND-CHANGEs
    /// (with any carried prepared-certificates) for round > 0.
    pub fn build_preprepare(
        &mut self,
        round: u64,
        value: Vec<u8>,
        justification: Vec<Message>,
    ) -> Message {
        let mut msg = Message::build(
            MessageKind::PrePrepare,
            round,
            self.state.sequence,
            self.id,
            Some(value),
            justification,
        );
        msg.sign(&self.signing_key);
        msg
    }

    /// Process an incoming PRE-PREPARE. Returns this participant's own
    /// PREPARE in response, if the message is accepted.
    pub fn on_preprepare(
        &mut self,
        msg: Message,
        validity: &dyn ExternalValidity,
    ) -> Result<EngineOutput, ConsensusError> {
        debug_assert_eq!(msg.kind, MessageKind::PrePrepare);
        if msg.sequence != self.state.sequence {
            return Err(if msg.sequence < self.state.sequence {
                ConsensusError::StaleSequence
            } else {
                ConsensusError::FutureSequence
            });
        }
        if msg.view > self.state.round {
            return Err(ConsensusError::FutureView);
        }
        if msg.view < self.state.round {
            trace!("dropping stale-round PRE-PREPARE view={}", msg.view);
            return Ok(EngineOutput::empty());
        }
        if msg.sender != self.config.primary_for_round(msg.view) {
            return Err(ConsensusError::WrongPrimary);
        }
        let value = msg.value.clone().ok_or(ConsensusError::ValueInvalid)?;
        if !validity.is_valid(&value) {
            return Err(ConsensusError::ValueInvalid);
        }
        if msg.view > 0 {
            self.validate_preprepare_justification(&msg)?;
        }

        if !self.log.record(msg.clone()) {
            return Ok(EngineOutput::empty());
        }

        let mut messages = Vec::new();
        if self.state.sent_prepare_for_round != Some(msg.view) {
            let mut prepare = Message::build(
                MessageKind::Prepare,
                msg.view,
                msg.sequence,
                self.id,
                Some(value),
                vec![],
            );
            prepare.sign(&self.signing_key);
            self.state.sent_prepare_for_round = Some(msg.view);
            self.log.record(prepare.clone());
            messages.push(prepare);
        }

        // A quorum of PREPAREs may already be sitting in the log if they
        // arrived before this PRE-PREPARE (buffered per §4.4 step 2 of the
        // protocol text): re-run the threshold check now that the matching
        // PRE-PREPARE is recorded, since no further PREPARE delivery would
        // otherwise retrigger it.
        if let Some(commit) = self.try_commit_on_prepare_quorum(msg.view, msg.sequence) {
            messages.push(commit);
        }
        Ok(EngineOutput::with_messages(messages))
    }

    /// If a PREPARE-quorum for (view, sequence) now exists and this
    /// participant has not yet committed for `view`, build, record, and
    /// return this participant's COMMIT. Also updates `(pr, pv)`.
    fn try_commit_on_prepare_quorum(&mut self, view: u64, sequence: u64) -> Option<Message> {
        let preprepare = self.log.preprepare(view, sequence)?.clone();
        let senders = self.log.prepare_senders(view, sequence, &preprepare.value);
        if senders.len() < self.config.quorum() as usize {
            return None;
        }
        if self.state.sent_commit_for_round == Some(view) {
            return None;
        }

        self.state.prepared_round = Some(view);
        self.state.prepared_value = preprepare.value.clone();

        let mut commit = Message::build(
            MessageKind::Commit,
            view,
            sequence,
            self.id,
            preprepare.value,
            vec![],
        );
        commit.sign(&self.signing_key);
        self.state.sent_commit_for_round = Some(view);
        self.log.record(commit.clone());
        Some(commit)
    }

    fn validate_preprepare_justification(&self, msg: &Message) -> Result<(), ConsensusError> {
        let round_changes: Vec<Message> = msg
            .justification
            .iter()
            .filter(|m| m.kind == MessageKind::RoundChange)
            .cloned()
            .collect();
        if round_changes.len() < self.config.quorum() as usize {
            return Err(ConsensusError::InvalidJustification);
        }
        for rc in &round_changes {
            if rc.view != msg.view || rc.sequence != msg.sequence {
                return Err(ConsensusError::InvalidJustification);
            }
            let sender = self
                .participants
                .get(rc.sender)
                .ok_or(ConsensusError::UnknownSender)?;
            if !rc.verify(&sender.verify_key) {
                return Err(ConsensusError::InvalidSignature);
            }
            if let Some(cert) = certificate::prepared_certificate_from_round_change(rc) {
                cert.validate(&self.config, &self.participants)?;
            }
        }
        if let Some(safe_value) = certificate::select_safe_value(&round_changes) {
            if msg.value.as_ref() != Some(&safe_value) {
                return Err(ConsensusError::InvalidJustification);
            }
        }
        Ok(())
    }

    /// Process an incoming PREPARE. Returns this participant's own COMMIT
    /// once a matching quorum of PREPAREs (for the current PRE-PREPARE's
    /// value) has been observed.
    pub fn on_prepare(&mut self, msg: Message) -> Result<EngineOutput, ConsensusError> {
        debug_assert_eq!(msg.kind, MessageKind::Prepare);
        if msg.sequence != self.state.sequence {
            return Err(if msg.sequence < self.state.sequence {
                ConsensusError::StaleSequence
            } else {
                ConsensusError::FutureSequence
            });
        }
        if msg.view > self.state.round {
            return Err(ConsensusError::FutureView);
        }
        if msg.view < self.state.round {
            return Ok(EngineOutput::empty());
        }
        if !self.log.record(msg.clone()) {
            return Ok(EngineOutput::empty());
        }

        // No corresponding PRE-PREPARE yet: the message stays in the log
        // (counted for quorum purposes) but there is nothing to commit
        // until it arrives; see `on_preprepare`'s re-check.
        match self.try_commit_on_prepare_quorum(msg.view, msg.sequence) {
            Some(commit) => Ok(EngineOutput::with_messages(vec![commit])),
            None => Ok(EngineOutput::empty()),
        }
    }

    /// Process an incoming COMMIT. Returns the decided value once a
    /// matching quorum of COMMITs is observed.
    pub fn on_commit(&mut self, msg: Message) -> Result<EngineOutput, ConsensusError> {
        debug_assert_eq!(msg.kind, MessageKind::Commit);
        if msg.sequence != self.state.sequence {
            return Err(if msg.sequence < self.state.sequence {
                ConsensusError::StaleSequence
            } else {
                ConsensusError::FutureSequence
            });
        }
        if !self.log.record(msg.clone()) {
            return Ok(EngineOutput::empty());
        }
        if self.state.decided {
            return Ok(EngineOutput::empty());
        }
        let senders = self.log.commit_senders(msg.view, msg.sequence, &msg.value);
        if senders.len() < self.config.quorum() as usize {
            return Ok(EngineOutput::empty());
        }
        self.state.decided = true;
        self.state.decided_view = msg.view;
        self.state.decided_value = msg.value.clone();
        let value = msg.value.clone().unwrap_or_default();
        info!(
            "instance {} decided in view {} with {} commits",
            msg.sequence,
            msg.view,
            senders.len()
        );
        Ok(EngineOutput::with_decision(value))
    }

    /// Build a verifiable [`CommitCertificate`] for the current decision,
    /// for handing to a late-joining or catching-up participant.
    pub fn commit_certificate(&self) -> Option<CommitCertificate> {
        if !self.state.decided {
            return None;
        }
        let value = self.state.decided_value.clone();
        let commits = self
            .log
            .commit_messages(self.state.decided_view, self.state.sequence, &value)
            .into_iter()
            .cloned()
            .collect();
        Some(CommitCertificate {
            sequence: self.state.sequence,
            value,
            commits,
        })
    }

    /// The sub-messages backing this participant's current prepared
    /// certificate (PRE-PREPARE followed by its quorum of PREPAREs), to
    /// attach as justification on this participant's own ROUND-CHANGE.
    /// Empty if this participant never prepared in the current instance.
    pub fn prepared_justification(&self) -> Vec<Message> {
        let Some((round, value)) = self.prepared().map(|(r, v)| (r, v.to_vec())) else {
            return Vec::new();
        };
        let Some(preprepare) = self.log.preprepare(round, self.state.sequence) else {
            return Vec::new();
        };
        let mut out = vec![preprepare.clone()];
        out.extend(
            self.log
                .prepare_messages(round, self.state.sequence, &Some(value))
                .into_iter()
                .cloned(),
        );
        out
    }

    /// Record an incoming ROUND-CHANGE in this instance's message log
    /// without otherwise acting on it; [`crate::round_change`] decides what
    /// to do once enough are collected.
    pub fn record_round_change(&mut self, msg: Message) -> bool {
        self.log.record(msg)
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    pub fn message_log_mut(&mut self) -> &mut MessageLog {
        &mut self.log
    }

    pub fn config(&self) -> &BftConfig {
        &self.config
    }

    pub fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}
