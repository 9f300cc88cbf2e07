//! Round timeout management for the IBFT consensus protocol.
//!
//! Unlike a three-phase scheduler with a separate timer per step, IBFT has a
//! single per-instance round timer: it starts when a round begins and fires
//! a ROUND-CHANGE if no decision is reached before `T(r)` elapses. Because a
//! round can end for other reasons (decision, a jump via f+1 round-changes)
//! before its timer would have fired, every `start` call mints a new epoch
//! token; a timer firing that does not carry the current epoch is stale and
//! must be discarded without triggering another round change.

use {
    crate::config::BftConfig,
    std::time::{Duration, Instant},
};

/// Tracks the single active round timer for one consensus instance.
#[derive(Debug)]
pub struct RoundTimer {
    config: BftConfig,
    /// Monotonically increasing token; bumped on every `start` and `cancel`.
    epoch: u64,
    started_at: Option<Instant>,
    round: u64,
}

impl RoundTimer {
    pub fn new(config: BftConfig) -> Self {
        Self {
            config,
            epoch: 0,
            started_at: None,
            round: 0,
        }
    }

    /// Start the timer for `round`, returning the epoch token this firing
    /// must present to be honored.
    pub fn start(&mut self, round: u64) -> u64 {
        self.epoch += 1;
        self.started_at = Some(Instant::now());
        self.round = round;
        self.epoch
    }

    /// Cancel any active timer. Bumps the epoch so a previously scheduled
    /// fire for the cancelled timer is recognized as stale.
    pub fn cancel(&mut self) {
        self.epoch += 1;
        self.started_at = None;
    }

    /// The token identifying the currently active timer, if any.
    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether `epoch` is still the current timer's token. A round-change
    /// timeout callback must check this before acting on a stale fire.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.started_at.is_some() && epoch == self.epoch
    }

    /// Duration before the round timer fires, for round `r`:
    /// `T0 * 2^r`, taken from [`BftConfig::round_timeout_ms`].
    pub fn duration_for(&self, round: u64) -> Duration {
        Duration::from_millis(self.config.round_timeout_ms(round))
    }

    /// Poll whether the active timer has expired. Returns the epoch token
    /// to present back to [`RoundTimer::is_current`] if so.
    pub fn check_expired(&self) -> Option<u64> {
        let started_at = self.started_at?;
        if started_at.elapsed() >= self.duration_for(self.round) {
            Some(self.epoch)
        } else {
            None
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        let started_at = self.started_at?;
        Some(self.duration_for(self.round).saturating_sub(started_at.elapsed()))
    }

    pub fn update_config(&mut self, config: BftConfig) {
        self.config = config;
    }
}
