//! Per-server up/down bookkeeping.
//!
//! A server that fails is marked down and skipped until its down-retry delay
//! has elapsed. The next lookup after that window may try to reconnect; a
//! failed attempt restarts the window from the time of that attempt.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Up,
    Down { since: Instant, failures: u32 },
}

/// Liveness of one server, owned by the ring and guarded by its lock.
#[derive(Debug, Clone)]
pub struct Liveness {
    state: State,
    retry_delay: Duration,
}

impl Liveness {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            state: State::Up,
            retry_delay,
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self.state, State::Up)
    }

    /// When the server last failed, if it is down.
    pub fn down_since(&self) -> Option<Instant> {
        match self.state {
            State::Up => None,
            State::Down { since, .. } => Some(since),
        }
    }

    /// Consecutive failures since the server was last up.
    pub fn failures(&self) -> u32 {
        match self.state {
            State::Up => 0,
            State::Down { failures, .. } => failures,
        }
    }

    /// Whether a down server's retry window has elapsed at `now`.
    pub fn retry_due(&self, now: Instant) -> bool {
        match self.state {
            State::Up => false,
            State::Down { since, .. } => now.saturating_duration_since(since) >= self.retry_delay,
        }
    }

    /// Whether the ring may hand this server out (possibly after reconnecting).
    pub fn may_attempt(&self, now: Instant) -> bool {
        self.is_up() || self.retry_due(now)
    }

    /// Records a failure at `now`. Returns true on the up -> down edge.
    pub fn mark_down(&mut self, now: Instant) -> bool {
        match self.state {
            State::Up => {
                self.state = State::Down {
                    since: now,
                    failures: 1,
                };
                true
            }
            State::Down { failures, .. } => {
                self.state = State::Down {
                    since: now,
                    failures: failures.saturating_add(1),
                };
                false
            }
        }
    }

    /// Returns true on the down -> up edge.
    pub fn mark_up(&mut self) -> bool {
        let was_down = !self.is_up();
        self.state = State::Up;
        was_down
    }
}
