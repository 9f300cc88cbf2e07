//! Istanbul BFT consensus core.
//!
//! Implements the Istanbul BFT (IBFT) replicated state machine: a
//! three-phase normal-case protocol (PRE-PREPARE → PREPARE → COMMIT) backed
//! by a ROUND-CHANGE/NEW-ROUND view-change subprotocol for when a round
//! fails to make progress.
//!
//! # Key Properties
//!
//! - **Deterministic finality**: a decided value is never reverted, for as
//!   long as fewer than `f` of `n = 3f + 1` participants are Byzantine.
//! - **Equal-weight quorums**: every participant casts exactly one vote;
//!   quorum is `2f + 1`.
//! - **Liveness**: an exponentially backed-off round timer and the `f+1`
//!   round-change catch-up rule bound how long a stalled round can persist.
//! - **Safety across rounds**: Safe-Value Selection ensures a round change
//!   never discards a value some honest participant may already have
//!   prepared.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Participant                         │
//! │  ┌─────────┐  ┌────────────┐  ┌───────────────────────┐  │
//! │  │ Config  │  │ Participant│  │     RoundTimer         │  │
//! │  │         │  │    Set     │  │  (epoch-tokened)       │  │
//! │  └─────────┘  └────────────┘  └───────────────────────┘  │
//! │  ┌──────────────────────────────────────────────────┐    │
//! │  │                 ConsensusEngine                   │    │
//! │  │   sequence, round, pr/pv, decided, MessageLog     │    │
//! │  └──────────────────────────────────────────────────┘    │
//! │  ┌──────────────┐  ┌──────────────────────────────┐      │
//! │  │ Certificate  │  │       RoundChange              │     │
//! │  │  building    │  │  ROUND-CHANGE / NEW-ROUND      │     │
//! │  └──────────────┘  └──────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod application;
pub mod certificate;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod message_log;
pub mod participant;
pub mod participant_set;
pub mod round_change;
pub mod timeout;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use application::{DecisionSink, ExternalValidity, FnValidity, RejectEmpty};
pub use certificate::{CommitCertificate, PreparedCertificate};
pub use config::BftConfig;
pub use engine::{ConsensusEngine, EngineOutput};
pub use error::{ConfigError, ConsensusError};
pub use message_log::MessageLog;
pub use participant::{DeliverOutcome, Participant, ParticipantState};
pub use participant_set::{ParticipantInfo, ParticipantSet};
pub use timeout::RoundTimer;
pub use transport::{InMemoryNetwork, Transport};
pub use types::{Message, MessageKind};
