//! Server abstractions for the consistent hash ring.
//!
//! A [`Server`] is one connection to one cache node. Wire encoding,
//! reconnect details and buffering all live behind this trait; the ring and
//! the fan-out engine only drive it through the calls below.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use mio::event::Source;
use parking_lot::{Mutex, MutexGuard};

use crate::error::ServerError;

/// Compact identifier for a server: its position in the ring's member list.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ServerId(pub usize);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operation handed to [`Server::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Get(&'a str),
    Set {
        key: &'a str,
        value: &'a [u8],
        ttl: u32,
    },
    Delete(&'a str),
    /// Queue a pipelined get for many keys; the answers are read back through
    /// the `multi_response_*` calls.
    GetMulti(&'a [String]),
}

/// Outcome of a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Value(Option<Bytes>),
    Stored(bool),
    Deleted(bool),
    /// The request was written and its answer will be streamed.
    Pending,
}

/// One connection to one cache node.
///
/// Implementations own their socket and buffers. Readiness of the socket is
/// exposed through [`Server::transport`] so that a single thread can wait on
/// many servers at once; TCP and Unix sockets are both valid transports.
pub trait Server: Send + 'static {
    /// Human-readable name, usually `host:port`.
    fn name(&self) -> &str;

    /// True while a connection is open.
    fn alive(&self) -> bool;

    /// Opens (or reopens) the connection.
    fn connect(&mut self) -> Result<(), ServerError>;

    /// Closes the connection, discarding any in-flight response.
    fn close(&mut self);

    /// Sends one request and, for single-key operations, reads its answer.
    fn request(&mut self, request: Request<'_>) -> Result<Response, ServerError>;

    /// Prepares to stream the answer of a previous [`Request::GetMulti`].
    fn multi_response_start(&mut self) -> Result<(), ServerError>;

    /// Returns every complete entry currently buffered, in stream order,
    /// without blocking.
    ///
    /// Must consume the transport until it would block: readiness is
    /// reported on edges, so bytes left unread may never be signalled again.
    fn multi_response_nonblock(&mut self) -> Result<Vec<(String, Bytes)>, ServerError>;

    /// True once the terminator of the multi-get answer has been read.
    fn multi_response_completed(&self) -> bool;

    /// Gives up on the in-flight multi-get answer. Never fails.
    fn multi_response_abort(&mut self);

    /// The pollable handle behind the connection, if one is open.
    fn transport(&mut self) -> Option<&mut dyn Source>;
}

/// A routed server, shareable across threads.
///
/// Returned by [`Ring::server_for_key`](crate::ring::Ring::server_for_key).
/// Lock it only for the duration of one operation.
pub struct ServerHandle<S> {
    id: ServerId,
    server: Arc<Mutex<S>>,
}

impl<S> ServerHandle<S> {
    pub(crate) fn new(id: ServerId, server: Arc<Mutex<S>>) -> Self {
        Self { id, server }
    }

    pub fn id(&self) -> ServerId {
        self.id
    }

    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.server.lock()
    }
}

impl<S> Clone for ServerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            server: Arc::clone(&self.server),
        }
    }
}

impl<S> fmt::Debug for ServerHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle").field("id", &self.id).finish()
    }
}
