//! Tunables of the multi-key processor.

use std::time::Duration;

use serde::Deserialize;

use corelib::config::duration_ms;

use crate::retry::BoundedRetry;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FanoutOptions {
    /// Budget shared by every server of one attempt, counted from the moment
    /// keys have been grouped.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    pub retry: BoundedRetry,
}

impl Default for FanoutOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            retry: BoundedRetry::default(),
        }
    }
}
