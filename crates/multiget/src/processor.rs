//! Best-effort retrieval of many keys across many servers.
//!
//! # Algorithm
//!
//! 1. Validate keys and group them by owning server, under the ring lock
//! 2. Send each server one pipelined get for its keys; drop servers that
//!    are down or fail to accept it
//! 3. Wait on every remaining socket at once, bounded by one deadline
//! 4. Drain whatever is readable, hand entries to the caller, retire
//!    servers whose answer is complete
//! 5. On deadline, abort the rest and return what arrived
//!
//! A network error in step 4 invalidates the attempt: all servers are
//! aborted, the failing one is marked down and the call starts over from
//! step 1 as long as the [`RetryPolicy`] allows.

use std::thread;
use std::time::Instant;

use bytes::Bytes;
use corelib::{
    KeyManager, NetworkError, Request, Ring, RingState, Server, ServerError, ServerHandle,
    ServerId,
};
use metrics::counter;
use parking_lot::MutexGuard;
use tracing::{debug, warn};

use crate::error::FanoutError;
use crate::options::FanoutOptions;
use crate::poller::Readiness;
use crate::retry::RetryPolicy;

/// How one attempt ended, when it did not simply finish.
enum AttemptError {
    Drain(NetworkError),
    Poll(std::io::Error),
}

/// A server with an answer still streaming in.
struct Pending<'h, S> {
    id: ServerId,
    server: MutexGuard<'h, S>,
}

/// Fans a multi-key get out over a [`Ring`].
///
/// Holds no state between calls; every call to [`process`](Self::process)
/// derives its groups, deadline and poller from scratch.
pub struct MultiKeyProcessor<'a, S, K: ?Sized> {
    ring: &'a Ring<S>,
    keys: &'a K,
    options: FanoutOptions,
    retry: Box<dyn RetryPolicy>,
}

impl<'a, S: Server, K: KeyManager + ?Sized> MultiKeyProcessor<'a, S, K> {
    pub fn new(ring: &'a Ring<S>, keys: &'a K) -> Self {
        Self::with_options(ring, keys, FanoutOptions::default())
    }

    pub fn with_options(ring: &'a Ring<S>, keys: &'a K, options: FanoutOptions) -> Self {
        Self {
            ring,
            keys,
            retry: Box::new(options.retry.clone()),
            options,
        }
    }

    /// Replaces the retry policy taken from the options.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy) -> Self {
        self.retry = Box::new(policy);
        self
    }

    pub fn options(&self) -> &FanoutOptions {
        &self.options
    }

    /// Fetches `keys`, calling `consumer` once per entry as it arrives.
    ///
    /// Keys that are malformed, have no live server, live on a server that
    /// fails or answer too late are simply never passed to `consumer`. When
    /// an attempt is retried, entries delivered by the failed attempt may be
    /// delivered again.
    ///
    /// `consumer` runs while the ring lock and the locks of every server
    /// still answering are held. It must not call into the [`Ring`] or lock
    /// a [`ServerHandle`]; doing so deadlocks the calling thread. Collect
    /// what you need and act on it once `process` has returned.
    pub fn process<I, F>(&self, keys: I, mut consumer: F) -> Result<(), FanoutError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: FnMut(String, Bytes),
    {
        let raw: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_owned()).collect();
        if raw.is_empty() {
            return Ok(());
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self
                .ring
                .lock(|state| self.attempt(state, &raw, &mut consumer));

            match outcome {
                Ok(()) => return Ok(()),
                Err(AttemptError::Poll(err)) => return Err(FanoutError::Poll(err)),
                Err(AttemptError::Drain(err)) => {
                    if !self.retry.should_retry(attempts) {
                        warn!(attempts, error = %err, policy = self.retry.name(), "giving up on multi-get");
                        return Err(FanoutError::RetriesExhausted {
                            attempts,
                            source: err,
                        });
                    }

                    let backoff = self.retry.backoff(attempts);
                    debug!(
                        attempt = attempts,
                        error = %err,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying multi-get"
                    );
                    counter!("memring_multiget_retries_total").increment(1);
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                }
            }
        }
    }

    /// One pass from grouping to drained sockets. Runs under the ring lock.
    fn attempt<F>(
        &self,
        state: &mut RingState<S>,
        raw: &[String],
        consumer: &mut F,
    ) -> Result<(), AttemptError>
    where
        F: FnMut(String, Bytes),
    {
        let mut valid = Vec::with_capacity(raw.len());
        for key in raw {
            match self.keys.validate_key(key) {
                Ok(key) => valid.push(key),
                Err(err) => warn!(key = %key, error = %err, "skipping malformed key"),
            }
        }

        let grouping = state.keys_grouped_by_server(valid);
        if !grouping.unroutable.is_empty() {
            warn!(
                keys = grouping.unroutable.len(),
                "no server available for some keys, skipping them"
            );
        }
        if grouping.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now() + self.options.timeout;
        let mut readiness =
            Readiness::new(grouping.server_count()).map_err(AttemptError::Poll)?;

        let handles: Vec<(ServerHandle<S>, &Vec<String>)> = grouping
            .by_server
            .iter()
            .filter_map(|(id, keys)| state.handle(*id).map(|handle| (handle, keys)))
            .collect();

        let mut pending: Vec<Pending<'_, S>> = Vec::with_capacity(handles.len());
        for (handle, keys) in &handles {
            let id = handle.id();
            // Before taking the server lock: this may reconnect.
            if !state.ensure_alive(id) {
                debug!(
                    server = state.name(id).unwrap_or_default(),
                    "server not alive, skipping its keys"
                );
                continue;
            }

            let mut server = handle.lock();
            match dispatch(&mut *server, keys.as_slice(), &readiness, id) {
                Ok(()) => pending.push(Pending { id, server }),
                Err(err) => {
                    server.multi_response_abort();
                    let network = err.is_network();
                    if network {
                        server.close();
                    }
                    drop(server);
                    warn!(
                        server = state.name(id).unwrap_or_default(),
                        error = %err,
                        "dropping server from multi-get"
                    );
                    if network {
                        state.mark_down(id);
                    }
                }
            }
        }

        let outcome = self.drain(state, &mut readiness, &mut pending, deadline, consumer);

        for entry in &mut pending {
            release(&readiness, &mut *entry.server);
        }
        outcome
    }

    fn drain<F>(
        &self,
        state: &mut RingState<S>,
        readiness: &mut Readiness,
        pending: &mut Vec<Pending<'_, S>>,
        deadline: Instant,
        consumer: &mut F,
    ) -> Result<(), AttemptError>
    where
        F: FnMut(String, Bytes),
    {
        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.timed_out(state, pending);
                return Ok(());
            }

            let ready = readiness.wait(remaining).map_err(AttemptError::Poll)?;
            if ready.is_empty() {
                if Instant::now() >= deadline {
                    self.timed_out(state, pending);
                    return Ok(());
                }
                continue;
            }

            for id in ready {
                let Some(idx) = pending.iter().position(|p| p.id == id) else {
                    continue;
                };

                match self.drain_ready(&mut *pending[idx].server, id, readiness, consumer) {
                    Ok(false) => {}
                    Ok(true) => {
                        let mut done = pending.swap_remove(idx);
                        if let Some(transport) = done.server.transport() {
                            readiness.unwatch(transport);
                        }
                    }
                    Err(ServerError::Network(err)) => {
                        let mut failed = pending.swap_remove(idx);
                        release(readiness, &mut *failed.server);
                        failed.server.close();
                        drop(failed);
                        warn!(
                            server = state.name(id).unwrap_or_default(),
                            error = %err,
                            "network error while draining multi-get"
                        );
                        state.mark_down(id);
                        return Err(AttemptError::Drain(err));
                    }
                    Err(err) => {
                        let mut failed = pending.swap_remove(idx);
                        release(readiness, &mut *failed.server);
                        warn!(
                            server = state.name(id).unwrap_or_default(),
                            error = %err,
                            "dropping server from multi-get"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Reads what one server has buffered. Returns whether its answer is
    /// complete.
    fn drain_ready<F>(
        &self,
        server: &mut S,
        id: ServerId,
        readiness: &Readiness,
        consumer: &mut F,
    ) -> Result<bool, ServerError>
    where
        F: FnMut(String, Bytes),
    {
        for (key, value) in server.multi_response_nonblock()? {
            consumer(self.keys.key_without_namespace(&key).to_owned(), value);
        }

        if server.multi_response_completed() {
            return Ok(true);
        }

        let name = server.name().to_string();
        let transport = server
            .transport()
            .ok_or_else(|| NetworkError::new(&name, "transport closed mid-response"))?;
        readiness
            .rearm(transport, id)
            .map_err(|err| NetworkError::io(name, err))?;
        Ok(false)
    }

    fn timed_out(&self, state: &RingState<S>, pending: &[Pending<'_, S>]) {
        let servers: Vec<&str> = pending
            .iter()
            .filter_map(|p| state.name(p.id))
            .collect();
        warn!(
            timeout_ms = self.options.timeout.as_millis() as u64,
            servers = ?servers,
            "multi-get deadline passed, aborting remaining servers"
        );
        counter!("memring_multiget_timeouts_total").increment(1);
    }
}

/// Sends one server its share of the keys and starts watching its socket.
fn dispatch<S: Server>(
    server: &mut S,
    keys: &[String],
    readiness: &Readiness,
    id: ServerId,
) -> Result<(), ServerError> {
    server.request(Request::GetMulti(keys))?;
    server.multi_response_start()?;

    let name = server.name().to_string();
    let transport = server
        .transport()
        .ok_or_else(|| NetworkError::new(&name, "no open transport"))?;
    readiness
        .watch(transport, id)
        .map_err(|err| NetworkError::io(name, err))?;
    Ok(())
}

/// Stops watching a server and abandons its in-flight answer.
fn release<S: Server>(readiness: &Readiness, server: &mut S) {
    if let Some(transport) = server.transport() {
        readiness.unwatch(transport);
    }
    server.multi_response_abort();
}
