//! Consistent hash ring implementation.
//!
//! The ring owns the configured servers, the continuum built from them and
//! every server's liveness. All of it sits behind one ring-wide lock: see
//! [`Ring::lock`].

pub mod builder;
pub mod ring;

pub use builder::RingBuilder;
pub use ring::{Grouping, Ring, RingState};
