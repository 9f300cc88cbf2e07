//! The per-participant state machine facade: single-writer owner of the
//! engine, timer, and message log for one running instance stream.
//!
//! All mutation happens through [`Participant::propose`], [`Participant::deliver`],
//! and [`Participant::on_timer_fired`] — there is no concurrent access to the
//! state underneath. Callers own the transport and the event loop; this
//! type only decides what to send in response to what it's told.

use {
    crate::{
        application::{DecisionSink, ExternalValidity},
        certificate,
        config::BftConfig,
        engine::ConsensusEngine,
        error::ConsensusError,
        participant_set::ParticipantSet,
        round_change,
        timeout::RoundTimer,
        types::{Message, MessageKind},
    },
    log::*,
    solana_keypair::Keypair,
    std::collections::VecDeque,
};

/// Outcome of handing the participant a raw inbound message.
#[derive(Debug, Default)]
pub struct DeliverOutcome {
    /// Messages this participant now wants broadcast to the rest of the set.
    pub outbound: Vec<Message>,
    /// Set once this delivery caused the current instance to decide.
    pub decided: Option<(u64, Vec<u8>)>,
}

/// Observability snapshot of `{λ, r, pr, lock_round, decided?}` (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantState {
    /// The current consensus instance (`λ`).
    pub sequence: u64,
    /// The current round within `sequence` (`r`).
    pub round: u64,
    /// Highest round at which this participant sent a PREPARE and observed
    /// a PREPARE-quorum for the current instance (`pr`), if any.
    pub prepared_round: Option<u64>,
    /// Equal to `prepared_round` in this implementation — see `state()`.
    pub lock_round: Option<u64>,
    /// The value paired with `prepared_round`/`lock_round`.
    pub prepared_value: Option<Vec<u8>>,
    /// Whether `sequence` has decided.
    pub decided: bool,
}

/// The consensus participant: engine + round timer + dispatch logic.
pub struct Participant<V: ExternalValidity, D: DecisionSink> {
    engine: ConsensusEngine,
    timer: RoundTimer,
    validity: V,
    decision_sink: D,
    id: u32,
    signing_key: Keypair,
    /// Round for which this participant has already acted as primary
    /// (sent NEW-ROUND + PRE-PREPARE); guards against resending on repeat
    /// quorum observations.
    led_round: Option<u64>,
    /// A value supplied via `propose` before this participant became
    /// primary; consumed the next time it leads a round.
    pending_proposal: Option<Vec<u8>>,
    /// Messages that arrived for a future sequence or a future round of the
    /// current sequence (§4.6), bounded per §5's backpressure policy: on
    /// overflow the oldest buffered entry is evicted first, ahead of
    /// dropping current-round traffic.
    pending: VecDeque<Message>,
    max_pending: usize,
}

impl<V: ExternalValidity, D: DecisionSink> Participant<V, D> {
    pub fn new(
        config: BftConfig,
        id: u32,
        signing_key: Keypair,
        participants: ParticipantSet,
        validity: V,
        decision_sink: D,
    ) -> Self {
        let signing_key_copy = Keypair::from_bytes(&signing_key.to_bytes())
            .expect("round-tripping a freshly constructed keypair cannot fail");
        let mut timer = RoundTimer::new(config);
        timer.start(0);
        Self {
            engine: ConsensusEngine::new(config, id, signing_key, participants),
            timer,
            validity,
            decision_sink,
            id,
            signing_key: signing_key_copy,
            led_round: None,
            pending_proposal: None,
            pending: VecDeque::new(),
            max_pending: config.max_buffered_messages,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.engine.sequence()
    }

    pub fn round(&self) -> u64 {
        self.engine.round()
    }

    pub fn current_timer_epoch(&self) -> u64 {
        self.timer.current_epoch()
    }

    /// Snapshot of `{λ, r, pr, lock_round, decided?}` for observability
    /// (§6 state-inspection interface). This implementation tracks a single
    /// prepared round/value pair that serves both roles the protocol text
    /// names separately (`pr`/`pv` and `lock_round`/`lock_value`) — see
    /// DESIGN.md for why that collapse is safe.
    pub fn state(&self) -> ParticipantState {
        let (prepared_round, prepared_value) = match self.engine.prepared() {
            Some((round, value)) => (Some(round), Some(value.to_vec())),
            None => (None, None),
        };
        ParticipantState {
            sequence: self.engine.sequence(),
            round: self.engine.round(),
            prepared_round,
            lock_round: prepared_round,
            prepared_value,
            decided: self.engine.is_decided(),
        }
    }

    /// Propose `value` for the current instance. If this participant is
    /// already primary for the current round, immediately builds and
    /// self-processes a PRE-PREPARE, returning it (and the PREPARE it
    /// produces) for broadcast. Otherwise the value is held and used the
    /// next time this participant leads a round.
    pub fn propose(&mut self, value: Vec<u8>) -> Vec<Message> {
        let round = self.engine.round();
        if self.engine.config().primary_for_round(round) != self.id || self.engine.is_decided() {
            self.pending_proposal = Some(value);
            return Vec::new();
        }
        let preprepare = self.engine.build_preprepare(round, value, vec![]);
        self.led_round = Some(round);
        self.self_deliver(preprepare)
    }

    /// Hand the participant a raw (already decoded) message from the
    /// network. Verifies the sender's signature, drops stale-instance
    /// traffic, buffers future-sequence/future-round traffic for later, and
    /// dispatches everything else to the engine or the round-change logic.
    pub fn deliver(&mut self, msg: Message) -> DeliverOutcome {
        match self.verify_and_dispatch(msg.clone()) {
            Ok(outcome) => outcome,
            Err(err @ (ConsensusError::FutureSequence | ConsensusError::FutureView)) => {
                debug!("buffering message for later: {err}");
                self.buffer(msg);
                DeliverOutcome::default()
            }
            Err(err) => {
                warn!("dropping message: {err}");
                DeliverOutcome::default()
            }
        }
    }

    /// Hold `msg` until the instance/round it belongs to becomes current.
    /// Bounded per §5: the oldest buffered entry is evicted on overflow
    /// rather than dropping current-round traffic.
    fn buffer(&mut self, msg: Message) {
        if self.pending.len() >= self.max_pending {
            self.pending.pop_front();
        }
        self.pending.push_back(msg);
    }

    /// Re-attempt every buffered message now that the instance or round has
    /// advanced. Messages still ahead of the new state are re-buffered by
    /// the recursive `deliver` call; anything now stale is simply dropped.
    fn drain_pending(&mut self) -> DeliverOutcome {
        let backlog: Vec<Message> = self.pending.drain(..).collect();
        let mut outbound = Vec::new();
        let mut decided = None;
        for msg in backlog {
            let outcome = self.deliver(msg);
            outbound.extend(outcome.outbound);
            decided = decided.or(outcome.decided);
        }
        DeliverOutcome { outbound, decided }
    }

    fn self_deliver(&mut self, msg: Message) -> Vec<Message> {
        let mut outbound = vec![msg.clone()];
        outbound.extend(self.deliver(msg).outbound);
        outbound
    }

    fn verify_and_dispatch(&mut self, msg: Message) -> Result<DeliverOutcome, ConsensusError> {
        let sender = self
            .engine
            .participants()
            .get(msg.sender)
            .ok_or(ConsensusError::UnknownSender)?;
        if !msg.verify(&sender.verify_key) {
            return Err(ConsensusError::InvalidSignature);
        }

        match msg.kind {
            MessageKind::PrePrepare => {
                let view = msg.view;
                let out = self.engine.on_preprepare(msg, &self.validity)?;
                if view == self.engine.round() {
                    self.timer.start(view);
                }
                Ok(DeliverOutcome {
                    outbound: out.messages,
                    decided: None,
                })
            }
            MessageKind::Prepare => {
                let out = self.engine.on_prepare(msg)?;
                Ok(DeliverOutcome {
                    outbound: out.messages,
                    decided: None,
                })
            }
            MessageKind::Commit => {
                let out = self.engine.on_commit(msg)?;
                let decided = out.decided.map(|value| {
                    let sequence = self.engine.sequence();
                    self.decision_sink.on_decision(sequence, value.clone());
                    (sequence, value)
                });
                let mut outbound = out.messages;
                let mut decided = decided;
                if decided.is_some() {
                    self.advance_to_next_instance();
                    let drained = self.drain_pending();
                    outbound.extend(drained.outbound);
                    decided = decided.or(drained.decided);
                }
                Ok(DeliverOutcome { outbound, decided })
            }
            MessageKind::RoundChange => {
                let (outbound, decided) = self.handle_round_change(msg)?;
                Ok(DeliverOutcome { outbound, decided })
            }
            MessageKind::NewRound => {
                // NEW-ROUND is informative proof-of-quorum; the PRE-PREPARE
                // that follows it carries the same justification and is
                // what actually advances state, so there is nothing further
                // to do here beyond having verified it and resetting the
                // timer, which only a valid sender for this view may do.
                let config = *self.engine.config();
                if msg.sequence == self.engine.sequence()
                    && msg.view == self.engine.round()
                    && config.primary_for_round(msg.view) == msg.sender
                {
                    self.timer.start(msg.view);
                }
                Ok(DeliverOutcome::default())
            }
        }
    }

    fn handle_round_change(
        &mut self,
        msg: Message,
    ) -> Result<(Vec<Message>, Option<(u64, Vec<u8>)>), ConsensusError> {
        if msg.sequence != self.engine.sequence() {
            return Err(if msg.sequence < self.engine.sequence() {
                ConsensusError::StaleSequence
            } else {
                ConsensusError::FutureSequence
            });
        }

        let config = *self.engine.config();
        let round = self.engine.round();
        if msg.view <= round && config.primary_for_round(msg.view) != self.id {
            trace!("dropping stale ROUND-CHANGE for view={}", msg.view);
            return Ok((Vec::new(), None));
        }
        if let Some(cert) = certificate::prepared_certificate_from_round_change(&msg) {
            cert.validate(&config, self.engine.participants())?;
        }

        self.engine.record_round_change(msg);

        let mut outbound = Vec::new();
        let mut decided = None;

        if let Some(target) = round_change::catchup_jump_round(&config, self.engine.message_log(), self.engine.round())
        {
            self.jump_to_round(target, &mut outbound);
        }

        let round = self.engine.round();
        if round_change::round_change_quorum_reached(&config, self.engine.message_log(), round)
            && config.primary_for_round(round) == self.id
            && self.led_round != Some(round)
        {
            decided = decided.or(self.lead_round(round, &mut outbound));
        }

        Ok((outbound, decided))
    }

    /// Jump directly to `round` on the f+1 catch-up signal, sending this
    /// participant's own ROUND-CHANGE for it without waiting on its timer,
    /// then replaying anything buffered for the round just reached.
    fn jump_to_round(&mut self, round: u64, outbound: &mut Vec<Message>) {
        self.engine.advance_round(round);
        self.timer.start(round);
        let justification = self.engine.prepared_justification();
        let rc = round_change::build_round_change(self.id, &self.signing_key, self.engine.sequence(), round, justification);
        self.engine.record_round_change(rc.clone());
        outbound.push(rc);
        outbound.extend(self.drain_pending().outbound);
    }

    /// Act as primary for `round`: broadcast NEW-ROUND plus the PRE-PREPARE
    /// it justifies, then self-process the PRE-PREPARE. Returns a decision
    /// if self-processing (plus any buffered COMMITs it unblocks) reaches one.
    fn lead_round(&mut self, round: u64, outbound: &mut Vec<Message>) -> Option<(u64, Vec<u8>)> {
        let round_changes = self.engine.message_log().round_change_messages(round).into_iter().cloned().collect::<Vec<_>>();
        let new_round = round_change::build_new_round(self.id, &self.signing_key, self.engine.sequence(), round, round_changes.clone());
        outbound.push(new_round);

        let candidate = self.pending_proposal.take().unwrap_or_default();
        let value = round_change::select_value_to_repropose(&round_changes, candidate);
        let preprepare = self.engine.build_preprepare(round, value, round_changes);
        self.led_round = Some(round);
        outbound.push(preprepare.clone());
        let outcome = self.deliver(preprepare);
        outbound.extend(outcome.outbound);
        outcome.decided
    }

    /// Called when this participant's round timer epoch `epoch` fires.
    /// Stale epochs (superseded by a later `start`) are silently discarded.
    pub fn on_timer_fired(&mut self, epoch: u64) -> Vec<Message> {
        if !self.timer.is_current(epoch) {
            return Vec::new();
        }
        if self.engine.is_decided() {
            return Vec::new();
        }
        let next_round = self.engine.round() + 1;
        self.engine.advance_round(next_round);
        self.timer.start(next_round);
        let justification = self.engine.prepared_justification();
        let rc = round_change::build_round_change(
            self.id,
            &self.signing_key,
            self.engine.sequence(),
            next_round,
            justification,
        );
        self.engine.record_round_change(rc.clone());
        let mut outbound = vec![rc];
        outbound.extend(self.drain_pending().outbound);
        outbound
    }

    fn advance_to_next_instance(&mut self) {
        let next_sequence = self.engine.sequence() + 1;
        self.engine.reset_for_sequence(next_sequence);
        self.led_round = None;
        self.timer.start(0);
    }

    pub fn is_decided(&self) -> bool {
        self.engine.is_decided()
    }
}
