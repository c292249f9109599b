//! Error types for multi-key retrieval.

use std::io;

use corelib::NetworkError;

/// Failures that escape [`MultiKeyProcessor::process`](crate::MultiKeyProcessor::process).
///
/// Everything else (dead servers, malformed keys, protocol errors, timeouts)
/// only removes keys from the result.
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// The readiness poller could not be created or waited on.
    #[error("readiness poller failed: {0}")]
    Poll(#[from] io::Error),

    /// Every attempt allowed by the retry policy hit a network error while
    /// draining.
    #[error("multi-get failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: NetworkError,
    },
}
