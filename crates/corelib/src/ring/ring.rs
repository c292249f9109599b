//! Hash ring data structure and key routing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{RingOptions, ServerSpec};
use crate::continuum::{Continuum, ContinuumEntry};
use crate::error::{Result, RingError, ServerError};
use crate::liveness::Liveness;
use crate::partitioner::Partitioner;
use crate::server::{Server, ServerHandle, ServerId};

use super::builder::RingBuilder;

pub(crate) struct Member<S> {
    spec: ServerSpec,
    name: String,
    server: Arc<Mutex<S>>,
    liveness: Liveness,
}

impl<S: Server> Member<S> {
    pub(crate) fn new(spec: ServerSpec, server: S, options: &RingOptions) -> Self {
        Self {
            name: spec.name(),
            spec,
            server: Arc::new(Mutex::new(server)),
            liveness: Liveness::new(options.down_retry_delay),
        }
    }

    fn mark_down(&mut self, now: Instant) {
        if self.liveness.mark_down(now) {
            info!(server = %self.name, "server marked down");
            counter!("memring_server_down_total", "server" => self.name.clone()).increment(1);
        } else {
            debug!(
                server = %self.name,
                failures = self.liveness.failures(),
                "server still down"
            );
        }
    }

    fn mark_up(&mut self) {
        if self.liveness.mark_up() {
            info!(server = %self.name, "server is back up");
            counter!("memring_server_up_total", "server" => self.name.clone()).increment(1);
        }
    }

    /// Liveness check with resurrection.
    ///
    /// Takes the server lock, so must run under the ring lock and never while
    /// the caller already holds this server's lock.
    fn ensure_alive(&mut self, now: Instant) -> bool {
        if !self.liveness.may_attempt(now) {
            return false;
        }

        let outcome = {
            let mut server = self.server.lock();
            if self.liveness.is_up() && server.alive() {
                return true;
            }
            server.connect()
        };

        match outcome {
            Ok(()) => {
                self.mark_up();
                true
            }
            Err(err) => {
                warn!(server = %self.name, error = %err, "connect failed");
                self.mark_down(now);
                false
            }
        }
    }
}

/// Keys partitioned by owning server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    pub by_server: BTreeMap<ServerId, Vec<String>>,
    /// Keys for which no server was available.
    pub unroutable: Vec<String>,
}

impl Grouping {
    pub fn server_count(&self) -> usize {
        self.by_server.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_server.is_empty()
    }
}

/// Ring contents, reachable only while holding the ring lock.
pub struct RingState<S> {
    members: Vec<Member<S>>,
    /// `None` with fewer than two servers: nothing to hash.
    continuum: Option<Continuum>,
    partitioner: Box<dyn Partitioner>,
    options: RingOptions,
}

impl<S: Server> RingState<S> {
    pub(crate) fn new(
        members: Vec<Member<S>>,
        partitioner: Box<dyn Partitioner>,
        options: RingOptions,
    ) -> Self {
        let continuum = if members.len() > 1 {
            let specs: Vec<ServerSpec> = members.iter().map(|m| m.spec.clone()).collect();
            Some(Continuum::build(&specs, options.points_per_server, partitioner.as_ref()))
        } else {
            None
        };

        info!(
            servers = members.len(),
            points = continuum.as_ref().map_or(0, Continuum::len),
            partitioner = partitioner.name(),
            "ring built"
        );

        Self {
            members,
            continuum,
            partitioner,
            options,
        }
    }

    pub fn server_count(&self) -> usize {
        self.members.len()
    }

    pub fn options(&self) -> &RingOptions {
        &self.options
    }

    /// Configured name of a server, `None` for an id this ring never issued.
    pub fn name(&self, id: ServerId) -> Option<&str> {
        self.members.get(id.0).map(|m| m.name.as_str())
    }

    pub fn is_up(&self, id: ServerId) -> bool {
        self.members.get(id.0).is_some_and(|m| m.liveness.is_up())
    }

    pub fn handle(&self, id: ServerId) -> Option<ServerHandle<S>> {
        self.members
            .get(id.0)
            .map(|m| ServerHandle::new(id, Arc::clone(&m.server)))
    }

    /// Makes sure the server can take a request, reconnecting it if it is
    /// down and its retry delay has elapsed.
    pub fn ensure_alive(&mut self, id: ServerId) -> bool {
        let now = Instant::now();
        self.members
            .get_mut(id.0)
            .is_some_and(|m| m.ensure_alive(now))
    }

    /// Records a network failure. The caller closes the connection itself;
    /// this only touches liveness and never takes the server lock.
    pub fn mark_down(&mut self, id: ServerId) {
        if let Some(member) = self.members.get_mut(id.0) {
            member.mark_down(Instant::now());
        }
    }

    pub fn mark_up(&mut self, id: ServerId) {
        if let Some(member) = self.members.get_mut(id.0) {
            member.mark_up();
        }
    }

    /// Resolves the server owning `key`.
    ///
    /// Walks clockwise from the key's token and returns the first server that
    /// is available, inspecting each server at most once. With failover
    /// disabled only the first candidate is considered.
    pub fn server_for_key(&mut self, key: &str) -> std::result::Result<ServerId, RingError> {
        let now = Instant::now();
        let RingState {
            members,
            continuum,
            partitioner,
            options,
        } = self;

        if members.is_empty() {
            return Err(RingError::Empty);
        }

        let Some(continuum) = continuum else {
            return if members[0].ensure_alive(now) {
                Ok(ServerId(0))
            } else {
                Err(RingError::Unavailable)
            };
        };

        let token = partitioner.partition(key.as_bytes());
        let mut inspected = vec![false; members.len()];
        let mut remaining = members.len();

        for entry in continuum.walk(continuum.position(token)) {
            let id = entry.server;
            if inspected[id.0] {
                continue;
            }
            inspected[id.0] = true;

            if members[id.0].ensure_alive(now) {
                return Ok(id);
            }

            remaining -= 1;
            if !options.failover || remaining == 0 {
                break;
            }
        }

        Err(RingError::Unavailable)
    }

    /// Partitions `keys` by owning server. Keys without a server are
    /// reported in [`Grouping::unroutable`], never merged into another group.
    pub fn keys_grouped_by_server<I, K>(&mut self, keys: I) -> Grouping
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut grouping = Grouping::default();
        for key in keys {
            let key = key.into();
            match self.server_for_key(&key) {
                Ok(id) => grouping.by_server.entry(id).or_default().push(key),
                Err(err) => {
                    debug!(key = %key, error = %err, "no server for key");
                    grouping.unroutable.push(key);
                }
            }
        }
        grouping
    }

    /// Closes every connection and forgets all failures.
    pub fn reset(&mut self) {
        for member in &mut self.members {
            member.server.lock().close();
            member.liveness.mark_up();
        }
        debug!(servers = self.members.len(), "ring reset");
    }
}

/// Failure-aware consistent hash ring over a pool of cache servers.
///
/// Single-key lookups hold the lock only while routing. Multi-key operations
/// take it through [`Ring::lock`] for their whole duration so that no
/// liveness transition can land between grouping keys and reading the
/// answers.
///
/// Lock order is ring lock, then server lock. Never take the ring lock while
/// holding a [`ServerHandle`] lock.
pub struct Ring<S> {
    state: Mutex<RingState<S>>,
}

impl<S: Server> Ring<S> {
    /// Builds a ring from `specs`, creating each server with `factory`.
    pub fn new<F>(specs: Vec<ServerSpec>, options: RingOptions, mut factory: F) -> Self
    where
        F: FnMut(&ServerSpec) -> S,
    {
        specs
            .into_iter()
            .fold(RingBuilder::new().with_options(options), |builder, spec| {
                let server = factory(&spec);
                builder.add_server(spec, server)
            })
            .build()
    }

    pub(crate) fn from_state(state: RingState<S>) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Runs `f` while holding the ring-wide lock.
    ///
    /// The lock is not reentrant: `f` must not call back into this `Ring`,
    /// or the calling thread deadlocks. Server locks may be taken inside `f`,
    /// each at most once.
    pub fn lock<R>(&self, f: impl FnOnce(&mut RingState<S>) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    pub fn server_for_key(&self, key: &str) -> std::result::Result<ServerHandle<S>, RingError> {
        let mut state = self.state.lock();
        let id = state.server_for_key(key)?;
        state.handle(id).ok_or(RingError::Unavailable)
    }

    pub fn keys_grouped_by_server<I, K>(&self, keys: I) -> Grouping
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.state.lock().keys_grouped_by_server(keys)
    }

    /// Routes a single-key operation and runs it on the owning server.
    ///
    /// A network failure closes that connection, marks the server down and
    /// routes again, at most once per configured server. Protocol errors are
    /// returned as they are.
    pub fn perform<T, F>(&self, key: &str, mut op: F) -> Result<T>
    where
        F: FnMut(&mut S) -> std::result::Result<T, ServerError>,
    {
        let attempts = self.server_count().max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let handle = self.server_for_key(key)?;
            let outcome = {
                let mut server = handle.lock();
                let outcome = op(&mut *server);
                if matches!(outcome, Err(ServerError::Network(_))) {
                    server.close();
                }
                outcome
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(ServerError::Network(err)) => {
                    warn!(key = %key, error = %err, attempt, "request failed, rerouting");
                    self.mark_down(handle.id());
                    if attempt >= attempts {
                        return Err(ServerError::Network(err).into());
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn mark_down(&self, id: ServerId) {
        self.state.lock().mark_down(id);
    }

    pub fn mark_up(&self, id: ServerId) {
        self.state.lock().mark_up(id);
    }

    pub fn reset(&self) {
        self.state.lock().reset();
    }

    pub fn is_up(&self, id: ServerId) -> bool {
        self.state.lock().is_up(id)
    }

    pub fn server_count(&self) -> usize {
        self.state.lock().server_count()
    }

    pub fn server_names(&self) -> Vec<String> {
        let state = self.state.lock();
        state.members.iter().map(|m| m.name.clone()).collect()
    }

    /// Snapshot of the continuum (empty with fewer than two servers).
    pub fn points(&self) -> Vec<ContinuumEntry> {
        let state = self.state.lock();
        state
            .continuum
            .as_ref()
            .map(|c| c.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn partitioner_name(&self) -> &'static str {
        self.state.lock().partitioner.name()
    }
}
