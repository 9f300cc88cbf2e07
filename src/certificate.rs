//! PREPARED-CERTIFICATE and COMMIT-CERTIFICATE construction and validation.
//!
//! A prepared-certificate is the PRE-PREPARE for (view, sequence, value) plus
//! a quorum of matching PREPARE messages; it is the proof a participant
//! carries forward across a round change so a later round's PRE-PREPARE can
//! be justified without re-running PREPARE. A commit-certificate is the
//! analogous proof of decision: a quorum of matching COMMIT messages.

use crate::{
    config::BftConfig,
    error::ConsensusError,
    participant_set::ParticipantSet,
    types::{Message, MessageKind},
};

/// Proof that a value was prepared at a given (view, sequence): the
/// PRE-PREPARE plus a quorum of matching PREPARE messages.
#[derive(Debug, Clone)]
pub struct PreparedCertificate {
    pub preprepare: Message,
    pub prepares: Vec<Message>,
}

impl PreparedCertificate {
    pub fn view(&self) -> u64 {
        self.preprepare.view
    }

    pub fn sequence(&self) -> u64 {
        self.preprepare.sequence
    }

    pub fn value(&self) -> &Option<Vec<u8>> {
        &self.preprepare.value
    }

    /// Validate internal consistency and quorum/signature requirements.
    pub fn validate(
        &self,
        config: &BftConfig,
        participants: &ParticipantSet,
    ) -> Result<(), ConsensusError> {
        if self.preprepare.kind != MessageKind::PrePrepare {
            return Err(ConsensusError::MalformedMessage);
        }
        let expected_sender = config.primary_for_round(self.preprepare.view);
        if self.preprepare.sender != expected_sender {
            return Err(ConsensusError::WrongPrimary);
        }
        verify_sender(&self.preprepare, participants)?;

        let mut distinct_senders = std::collections::HashSet::new();
        for prepare in &self.prepares {
            if prepare.kind != MessageKind::Prepare {
                return Err(ConsensusError::MalformedMessage);
            }
            if prepare.view != self.preprepare.view || prepare.sequence != self.preprepare.sequence
            {
                return Err(ConsensusError::InvalidJustification);
            }
            if prepare.value != self.preprepare.value {
                return Err(ConsensusError::InvalidJustification);
            }
            verify_sender(prepare, participants)?;
            distinct_senders.insert(prepare.sender);
        }
        if distinct_senders.len() < config.quorum() as usize {
            return Err(ConsensusError::InvalidJustification);
        }
        Ok(())
    }
}

/// Proof that a value was decided at a given sequence: a quorum of matching
/// COMMIT messages (the view they share is the view under which decision
/// occurred, not necessarily the instance's final view).
#[derive(Debug, Clone)]
pub struct CommitCertificate {
    pub sequence: u64,
    pub value: Option<Vec<u8>>,
    pub commits: Vec<Message>,
}

impl CommitCertificate {
    pub fn validate(
        &self,
        config: &BftConfig,
        participants: &ParticipantSet,
    ) -> Result<(), ConsensusError> {
        let mut distinct_senders = std::collections::HashSet::new();
        for commit in &self.commits {
            if commit.kind != MessageKind::Commit {
                return Err(ConsensusError::MalformedMessage);
            }
            if commit.sequence != self.sequence || commit.value != self.value {
                return Err(ConsensusError::InvalidJustification);
            }
            verify_sender(commit, participants)?;
            distinct_senders.insert(commit.sender);
        }
        if distinct_senders.len() < config.quorum() as usize {
            return Err(ConsensusError::InvalidJustification);
        }
        Ok(())
    }
}

fn verify_sender(msg: &Message, participants: &ParticipantSet) -> Result<(), ConsensusError> {
    let info = participants
        .get(msg.sender)
        .ok_or(ConsensusError::UnknownSender)?;
    if !msg.verify(&info.verify_key) {
        return Err(ConsensusError::InvalidSignature);
    }
    Ok(())
}

/// Extract the prepared-certificate carried in a ROUND-CHANGE message's
/// justification, if any. A ROUND-CHANGE justification holds either nothing
/// (the sender never prepared) or exactly one PRE-PREPARE followed by its
/// quorum of PREPAREs.
pub fn prepared_certificate_from_round_change(round_change: &Message) -> Option<PreparedCertificate> {
    let preprepare = round_change
        .justification
        .iter()
        .find(|m| m.kind == MessageKind::PrePrepare)?
        .clone();
    let prepares: Vec<Message> = round_change
        .justification
        .iter()
        .filter(|m| m.kind == MessageKind::Prepare)
        .cloned()
        .collect();
    Some(PreparedCertificate { preprepare, prepares })
}

/// Safe-Value Selection: given a quorum of ROUND-CHANGE messages, pick the
/// value to re-propose in the NEW-ROUND / PRE-PREPARE for the new round.
///
/// Among all prepared-certificates carried by the round-change set, picks
/// the one with the highest prepared round (`pr`); its value is the value
/// that must be re-proposed, since it is the only value any participant
/// could have locked on. If no round-change carries a prepared-certificate,
/// any valid value may be proposed (returns `None`).
///
/// Must derive the highest-`pr` value strictly from the *received*
/// ROUND-CHANGE set, not from the local participant's own message log —
/// a round-change set from other participants may justify a value this
/// participant never itself prepared.
pub fn select_safe_value(round_changes: &[Message]) -> Option<Vec<u8>> {
    round_changes
        .iter()
        .filter_map(prepared_certificate_from_round_change)
        .max_by_key(|cert| cert.view())
        .and_then(|cert| cert.value().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_keypair::Keypair;
    use solana_signer::Signer;

    fn set_of(n: usize) -> (Vec<Keypair>, ParticipantSet) {
        let keypairs: Vec<Keypair> = (0..n).map(|_| Keypair::new()).collect();
        let participants = ParticipantSet::new(keypairs.iter().map(|k| k.pubkey()).collect());
        (keypairs, participants)
    }

    fn signed(
        keypairs: &[Keypair],
        kind: MessageKind,
        view: u64,
        sequence: u64,
        sender: u32,
        value: Option<Vec<u8>>,
    ) -> Message {
        let mut msg = Message::build(kind, view, sequence, sender, value, vec![]);
        msg.sign(&keypairs[sender as usize]);
        msg
    }

    #[test]
    fn test_prepared_certificate_validates_with_quorum() {
        let (keypairs, participants) = set_of(4);
        let config = BftConfig::new(4, 1);
        let preprepare = signed(
            &keypairs,
            MessageKind::PrePrepare,
            0,
            0,
            0,
            Some(b"v".to_vec()),
        );
        let prepares = vec![
            signed(&keypairs, MessageKind::Prepare, 0, 0, 0, Some(b"v".to_vec())),
            signed(&keypairs, MessageKind::Prepare, 0, 0, 1, Some(b"v".to_vec())),
            signed(&keypairs, MessageKind::Prepare, 0, 0, 2, Some(b"v".to_vec())),
        ];
        let cert = PreparedCertificate { preprepare, prepares };
        assert!(cert.validate(&config, &participants).is_ok());
    }

    #[test]
    fn test_prepared_certificate_rejects_short_quorum() {
        let (keypairs, participants) = set_of(4);
        let config = BftConfig::new(4, 1);
        let preprepare = signed(
            &keypairs,
            MessageKind::PrePrepare,
            0,
            0,
            0,
            Some(b"v".to_vec()),
        );
        let prepares = vec![signed(
            &keypairs,
            MessageKind::Prepare,
            0,
            0,
            1,
            Some(b"v".to_vec()),
        )];
        let cert = PreparedCertificate { preprepare, prepares };
        assert_eq!(
            cert.validate(&config, &participants),
            Err(ConsensusError::InvalidJustification)
        );
    }

    #[test]
    fn test_prepared_certificate_rejects_mismatched_value() {
        let (keypairs, participants) = set_of(4);
        let config = BftConfig::new(4, 1);
        let preprepare = signed(
            &keypairs,
            MessageKind::PrePrepare,
            0,
            0,
            0,
            Some(b"v".to_vec()),
        );
        let prepares = vec![
            signed(&keypairs, MessageKind::Prepare, 0, 0, 0, Some(b"v".to_vec())),
            signed(&keypairs, MessageKind::Prepare, 0, 0, 1, Some(b"v".to_vec())),
            signed(&keypairs, MessageKind::Prepare, 0, 0, 2, Some(b"OTHER".to_vec())),
        ];
        let cert = PreparedCertificate { preprepare, prepares };
        assert_eq!(
            cert.validate(&config, &participants),
            Err(ConsensusError::InvalidJustification)
        );
    }

    #[test]
    fn test_prepared_certificate_rejects_wrong_primary() {
        let (keypairs, participants) = set_of(4);
        let config = BftConfig::new(4, 1);
        // view 0's primary is participant 0; sign as participant 1 instead.
        let preprepare = signed(
            &keypairs,
            MessageKind::PrePrepare,
            0,
            0,
            1,
            Some(b"v".to_vec()),
        );
        let cert = PreparedCertificate {
            preprepare,
            prepares: vec![],
        };
        assert_eq!(
            cert.validate(&config, &participants),
            Err(ConsensusError::WrongPrimary)
        );
    }

    #[test]
    fn test_commit_certificate_validates_with_quorum() {
        let (keypairs, participants) = set_of(4);
        let config = BftConfig::new(4, 1);
        let commits = vec![
            signed(&keypairs, MessageKind::Commit, 0, 7, 0, Some(b"v".to_vec())),
            signed(&keypairs, MessageKind::Commit, 0, 7, 1, Some(b"v".to_vec())),
            signed(&keypairs, MessageKind::Commit, 0, 7, 2, Some(b"v".to_vec())),
        ];
        let cert = CommitCertificate {
            sequence: 7,
            value: Some(b"v".to_vec()),
            commits,
        };
        assert!(cert.validate(&config, &participants).is_ok());
    }

    #[test]
    fn test_select_safe_value_picks_highest_prepared_round() {
        let (keypairs, _participants) = set_of(4);
        let low_cert_preprepare =
            signed(&keypairs, MessageKind::PrePrepare, 1, 0, 1, Some(b"LOW".to_vec()));
        let high_cert_preprepare =
            signed(&keypairs, MessageKind::PrePrepare, 3, 0, 3, Some(b"HIGH".to_vec()));

        let rc_low = Message::build(
            MessageKind::RoundChange,
            5,
            0,
            1,
            None,
            vec![low_cert_preprepare],
        );
        let rc_high = Message::build(
            MessageKind::RoundChange,
            5,
            0,
            3,
            None,
            vec![high_cert_preprepare],
        );
        let rc_empty = Message::build(MessageKind::RoundChange, 5, 0, 2, None, vec![]);

        let selected = select_safe_value(&[rc_low, rc_high, rc_empty]);
        assert_eq!(selected, Some(b"HIGH".to_vec()));
    }

    #[test]
    fn test_select_safe_value_none_when_nobody_prepared() {
        let rc = Message::build(MessageKind::RoundChange, 5, 0, 0, None, vec![]);
        assert_eq!(select_safe_value(&[rc]), None);
    }

    #[test]
    fn test_prepared_certificate_from_round_change_extracts_preprepare_and_prepares() {
        let (keypairs, _participants) = set_of(4);
        let preprepare = signed(
            &keypairs,
            MessageKind::PrePrepare,
            1,
            0,
            1,
            Some(b"v".to_vec()),
        );
        let prepare = signed(&keypairs, MessageKind::Prepare, 1, 0, 2, Some(b"v".to_vec()));
        let rc = Message::build(
            MessageKind::RoundChange,
            2,
            0,
            1,
            None,
            vec![preprepare, prepare],
        );
        let cert = prepared_certificate_from_round_change(&rc).unwrap();
        assert_eq!(cert.view(), 1);
        assert_eq!(cert.prepares.len(), 1);
    }
}
