//! Core partitioner trait definitions.

use crate::token::Token;

/// A partitioner converts bytes into tokens for placement on the hash ring.
///
/// Partitioners are stateless and thread-safe. They must be deterministic
/// across processes: two clients configured with the same servers have to
/// agree on every key's owner.
pub trait Partitioner: Send + Sync + 'static {
    /// Converts a key (or a point identifier) into a token.
    fn partition(&self, key: &[u8]) -> Token;

    /// Returns the name of this partitioner.
    fn name(&self) -> &'static str;
}
