//! SipHash-1-3 partitioner.

use crate::partitioner::traits::Partitioner;
use crate::token::Token;
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Partitioner backed by SipHash-1-3 with fixed zero keys.
///
/// Slower than [`Xxh3Partitioner`](super::Xxh3Partitioner) but with better
/// resistance to crafted keys piling onto one server.
#[derive(Clone, Copy, Debug, Default)]
pub struct SipPartitioner;

impl Partitioner for SipPartitioner {
    fn partition(&self, key: &[u8]) -> Token {
        let mut hasher = SipHasher13::new();
        hasher.write(key);
        Token(hasher.finish())
    }

    fn name(&self) -> &'static str {
        "SipPartitioner"
    }
}
