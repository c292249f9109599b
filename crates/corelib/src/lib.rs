//! Core library for routing memcached keys across a pool of servers.
//!
//! This crate provides the pieces a client needs to treat many independent
//! cache servers as one logical cache:
//! - Server specs and ring options
//! - Tokens and partitioners
//! - The weighted continuum
//! - Per-server liveness with timed resurrection
//! - The `Server` and `KeyManager` collaborator traits
//! - The `Ring`, which routes keys to live servers

pub mod config;
pub mod continuum;
pub mod error;
pub mod key;
pub mod liveness;
pub mod partitioner;
pub mod ring;
pub mod server;
pub mod token;

pub use config::{Address, ClientConfig, RingOptions, ServerSpec};
pub use continuum::{Continuum, ContinuumEntry};
pub use error::{ConfigError, Error, KeyError, NetworkError, Result, RingError, ServerError};
pub use key::{KeyManager, NamespacedKeys};
pub use liveness::Liveness;
pub use partitioner::Partitioner;
pub use ring::{Grouping, Ring, RingBuilder, RingState};
pub use server::{Request, Response, Server, ServerHandle, ServerId};
pub use token::Token;
