//! Readiness polling over server transports.
//!
//! Any [`mio::event::Source`] can be watched, so TCP and Unix sockets mix
//! freely in one multi-get. Readiness is edge-triggered: a transport that
//! was drained only partially must be [`rearm`](Readiness::rearm)ed.

use std::io;
use std::time::Duration;

use corelib::ServerId;
use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// One readiness set, alive for a single multi-get attempt.
///
/// Every watched transport must be unwatched before the set is dropped;
/// a source stays bound to the registry it was first registered with.
pub struct Readiness {
    poll: Poll,
    events: Events,
}

impl Readiness {
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity.max(1)),
        })
    }

    pub fn watch(&self, transport: &mut dyn Source, id: ServerId) -> io::Result<()> {
        self.poll
            .registry()
            .register(transport, Token(id.0), Interest::READABLE)
    }

    /// Asks to be told again if the transport is (still) readable.
    pub fn rearm(&self, transport: &mut dyn Source, id: ServerId) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(transport, Token(id.0), Interest::READABLE)
    }

    /// Stops watching. Errors are ignored: the transport may already be gone.
    pub fn unwatch(&self, transport: &mut dyn Source) {
        let _ = self.poll.registry().deregister(transport);
    }

    /// Blocks until at least one transport is readable or `timeout` passes.
    ///
    /// An empty result means nothing became readable; it can also be a
    /// spurious or interrupted wake-up, so callers check their deadline.
    pub fn wait(&mut self, timeout: Duration) -> io::Result<Vec<ServerId>> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(err) => return Err(err),
        }

        let mut ready: Vec<ServerId> = self.events.iter().map(|e| ServerId(e.token().0)).collect();
        ready.dedup();
        Ok(ready)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mio::net::UnixStream;
    use std::io::Write;

    #[test]
    fn test_wait_times_out_when_idle() {
        let (mut ours, _theirs) = UnixStream::pair().unwrap();
        let mut readiness = Readiness::new(1).unwrap();
        readiness.watch(&mut ours, ServerId(0)).unwrap();

        let ready = readiness.wait(Duration::from_millis(20)).unwrap();
        assert!(ready.is_empty());
        readiness.unwatch(&mut ours);
    }

    #[test]
    fn test_wait_reports_readable_transport() {
        let (mut a, mut a_peer) = UnixStream::pair().unwrap();
        let (mut b, _b_peer) = UnixStream::pair().unwrap();
        let mut readiness = Readiness::new(2).unwrap();
        readiness.watch(&mut a, ServerId(3)).unwrap();
        readiness.watch(&mut b, ServerId(7)).unwrap();

        a_peer.write_all(b"x").unwrap();
        let ready = readiness.wait(Duration::from_secs(1)).unwrap();
        assert_eq!(ready, vec![ServerId(3)]);

        readiness.unwatch(&mut a);
        readiness.unwatch(&mut b);
    }
}
