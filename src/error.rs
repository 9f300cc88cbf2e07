//! Error taxonomy for the consensus core.
//!
//! None of these variants are meant to propagate to the application: the
//! participant state machine's `deliver` boundary catches every one of them,
//! logs it, and drops the offending message. They exist so the internal
//! helpers (certificate validation, message log insertion, ...) have a
//! typed way to say *why* they refused something.

/// Reasons a message or certificate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConsensusError {
    #[error("message payload failed to decode")]
    MalformedMessage,
    #[error("signature did not verify against the sender's key")]
    InvalidSignature,
    #[error("sender is not the primary for this (view, sequence)")]
    WrongPrimary,
    #[error("message sequence is older than the current instance")]
    StaleSequence,
    #[error("message sequence is ahead of the current instance")]
    FutureSequence,
    #[error("message view is ahead of the current round")]
    FutureView,
    #[error("round > 0 justification failed the safety predicate")]
    InvalidJustification,
    #[error("external validity predicate rejected the value")]
    ValueInvalid,
    #[error("message digest already recorded")]
    DuplicateMessage,
    #[error("sender is not a member of the participant set")]
    UnknownSender,
}

/// Errors in [`crate::config::BftConfig`] construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("n must be >= 3f + 1 (got n={n}, f={f})")]
    InsufficientParticipants { n: u32, f: u32 },
    #[error("n must be > 0")]
    ZeroParticipants,
    #[error("base_round_timeout_ms must be > 0")]
    InvalidTimeout,
    #[error("gc_window must be > 0")]
    InvalidGcWindow,
}
