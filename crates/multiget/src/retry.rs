//! Retry policies for multi-key retrieval.
//!
//! A network error while draining answers leaves a socket in an unknown
//! state, so the whole multi-get is thrown away and started again from
//! grouping. The policy decides how often that may happen:
//!
//! - **BoundedRetry**: a fixed number of attempts with linear backoff

use std::time::Duration;

use serde::Deserialize;

use corelib::config::duration_ms;

/// Decides whether a failed multi-get attempt is tried again.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as one processor may be
/// shared across threads.
pub trait RetryPolicy: Send + Sync + 'static {
    /// Whether another attempt may follow `attempts` failed ones.
    fn should_retry(&self, attempts: u32) -> bool;

    /// Pause before the next attempt. Slept with the ring lock released.
    fn backoff(&self, attempts: u32) -> Duration;

    /// Get the policy name (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// At most `max_attempts` attempts, waiting `backoff × attempts` between them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BoundedRetry {
    /// Total attempts including the first (values below 1 count as 1).
    pub max_attempts: u32,
    #[serde(rename = "backoff_ms", with = "duration_ms")]
    pub backoff: Duration,
}

impl BoundedRetry {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Never retry.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self::new(3, Duration::ZERO)
    }
}

impl RetryPolicy for BoundedRetry {
    fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }

    fn backoff(&self, attempts: u32) -> Duration {
        self.backoff.saturating_mul(attempts)
    }

    fn name(&self) -> &'static str {
        "BoundedRetry"
    }
}
