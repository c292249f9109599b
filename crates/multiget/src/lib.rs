//! Multi-key fan-out over a consistent hash ring.
//!
//! This crate turns one request for many keys into one pipelined get per
//! owning server and reads the answers back on a single thread:
//! - Keys are grouped by server under the ring lock
//! - Every server's socket is watched by one readiness poller
//! - Entries are handed to the caller as soon as they are parsed
//! - One shared deadline bounds the whole call
//! - Network failures while draining retry the call under a bounded policy

pub mod error;
pub mod options;
pub mod poller;
pub mod processor;
pub mod retry;

pub use error::FanoutError;
pub use options::FanoutOptions;
pub use processor::MultiKeyProcessor;
pub use retry::{BoundedRetry, RetryPolicy};
