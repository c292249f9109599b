//! Error types for the core library.

use std::io;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No server could take the operation.
    #[error(transparent)]
    Ring(#[from] RingError),
    /// A server failed while handling the operation.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The key was rejected before any network activity.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// Invalid client configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// No viable server exists for an operation right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// The ring was built without any server.
    #[error("no servers configured")]
    Empty,
    /// Every candidate server is down.
    #[error("no server available")]
    Unavailable,
}

/// Transient connection-level failure reported by a server.
#[derive(Debug, thiserror::Error)]
#[error("{server}: {reason}")]
pub struct NetworkError {
    /// Name of the server that failed.
    pub server: String,
    /// Short description of the failure.
    pub reason: String,
    #[source]
    pub source: Option<io::Error>,
}

impl NetworkError {
    pub fn new(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Wraps an I/O error raised while talking to `server`.
    pub fn io(server: impl Into<String>, err: io::Error) -> Self {
        Self {
            server: server.into(),
            reason: err.kind().to_string(),
            source: Some(err),
        }
    }
}

/// Errors surfaced by a [`Server`](crate::server::Server) implementation.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    /// Well-formed but semantically invalid response.
    #[error("{server}: protocol error: {message}")]
    Protocol { server: String, message: String },
}

impl ServerError {
    pub fn protocol(server: impl Into<String>, message: impl Into<String>) -> Self {
        ServerError::Protocol {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ServerError::Network(_))
    }
}

/// A key rejected by the key manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("key must not be empty")]
    Empty,
    #[error("invalid key {key:?}: {reason}")]
    Invalid { key: String, reason: &'static str },
}

/// Invalid configuration input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid server {spec:?}: {reason}")]
    InvalidServer { spec: String, reason: &'static str },
    #[error("server {0:?} has weight 0")]
    ZeroWeight(String),
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}
