//! Partitioner abstraction for consistent hashing.
//!
//! Partitioners convert keys, and the per-point identifiers of servers, into
//! tokens that can be placed on the hash ring. Keys and points must go
//! through the same partitioner or routing is meaningless.

pub mod sip;
pub mod traits;
pub mod xxh3;

pub use sip::SipPartitioner;
pub use traits::Partitioner;
pub use xxh3::Xxh3Partitioner;
