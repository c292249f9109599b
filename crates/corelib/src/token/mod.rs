//! Positions on the hash ring.
//!
//! Tokens are plain `u64` values produced by a
//! [`Partitioner`](crate::partitioner::Partitioner). The ring is circular:
//! the successor of [`Token::MAX`] is [`Token::MIN`].

use std::fmt;

/// A position on the ring.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Token(pub u64);

impl Token {
    /// Start of the ring.
    pub const MIN: Token = Token(0);
    /// End of the ring.
    pub const MAX: Token = Token(u64::MAX);

    /// Clockwise distance from `self` to `other`.
    pub fn distance_to(&self, other: &Self) -> u64 {
        other.0.wrapping_sub(self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
