//! Fake cache servers for fan-out tests.
//!
//! Each fake owns one end of a Unix socket pair and plays the cache node on
//! the other end, answering a multi-get with `key value\n` lines followed by
//! `END\n`. Behavior is steered through a shared [`Control`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use corelib::{
    KeyError, KeyManager, NamespacedKeys, NetworkError, Request, Response, Ring, RingOptions,
    Server, ServerError, ServerSpec,
};
use mio::event::Source;
use mio::net::UnixStream;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Knobs and counters shared between a test and one fake server.
#[derive(Default)]
pub struct Control {
    /// Never write an answer.
    pub silent: AtomicBool,
    /// Refuse the multi-get request with a network error.
    pub refuse_dispatch: AtomicBool,
    /// Answer drains with a protocol error.
    pub protocol_error: AtomicBool,
    /// Number of upcoming drains that fail with a network error.
    pub fail_drains: AtomicUsize,
    pub connects: AtomicUsize,
    pub starts: AtomicUsize,
    pub aborts: AtomicUsize,
}

impl Control {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct Conn {
    ours: UnixStream,
    theirs: UnixStream,
}

pub struct FakeServer {
    name: String,
    data: Arc<HashMap<String, Bytes>>,
    control: Arc<Control>,
    conn: Option<Conn>,
    queued: Vec<String>,
    buf: Vec<u8>,
    completed: bool,
}

impl FakeServer {
    pub fn new(name: String, data: Arc<HashMap<String, Bytes>>, control: Arc<Control>) -> Self {
        Self {
            name,
            data,
            control,
            conn: None,
            queued: Vec::new(),
            buf: Vec::new(),
            completed: false,
        }
    }

    fn network(&self, reason: &str) -> ServerError {
        NetworkError::new(&self.name, reason).into()
    }

    fn conn(&mut self) -> Result<&mut Conn, ServerError> {
        let name = self.name.clone();
        self.conn
            .as_mut()
            .ok_or_else(|| NetworkError::new(name, "not connected").into())
    }

    /// Pulls everything the socket holds into `buf`.
    fn fill(&mut self) -> Result<(), ServerError> {
        let name = self.name.clone();
        let Some(conn) = self.conn.as_mut() else {
            return Err(NetworkError::new(name, "not connected").into());
        };
        let mut chunk = [0u8; 4096];
        loop {
            match conn.ours.read(&mut chunk) {
                Ok(0) => return Err(NetworkError::new(name, "connection closed").into()),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetworkError::io(name, err).into()),
            }
        }
    }
}

impl Server for FakeServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn alive(&self) -> bool {
        self.conn.is_some()
    }

    fn connect(&mut self) -> Result<(), ServerError> {
        self.control.connects.fetch_add(1, Ordering::SeqCst);
        let (ours, theirs) = UnixStream::pair().map_err(|e| NetworkError::io(&self.name, e))?;
        self.conn = Some(Conn { ours, theirs });
        Ok(())
    }

    fn close(&mut self) {
        self.conn = None;
        self.buf.clear();
    }

    fn request(&mut self, request: Request<'_>) -> Result<Response, ServerError> {
        self.conn()?;
        if self.control.refuse_dispatch.load(Ordering::SeqCst) {
            return Err(self.network("connection reset"));
        }
        match request {
            Request::GetMulti(keys) => {
                self.queued = keys.to_vec();
                Ok(Response::Pending)
            }
            Request::Get(key) => Ok(Response::Value(self.data.get(key).cloned())),
            other => Err(ServerError::protocol(&self.name, format!("unsupported: {:?}", other))),
        }
    }

    fn multi_response_start(&mut self) -> Result<(), ServerError> {
        self.control.starts.fetch_add(1, Ordering::SeqCst);
        self.completed = false;
        self.buf.clear();
        if self.control.silent.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut answer = Vec::new();
        for key in &self.queued {
            if let Some(value) = self.data.get(key) {
                answer.extend_from_slice(key.as_bytes());
                answer.push(b' ');
                answer.extend_from_slice(value);
                answer.push(b'\n');
            }
        }
        answer.extend_from_slice(b"END\n");

        let name = self.name.clone();
        let conn = self.conn()?;
        conn.theirs
            .write_all(&answer)
            .map_err(|e| NetworkError::io(name, e).into())
    }

    fn multi_response_nonblock(&mut self) -> Result<Vec<(String, Bytes)>, ServerError> {
        let failing = self
            .control
            .fail_drains
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(self.network("connection reset by peer"));
        }
        if self.control.protocol_error.load(Ordering::SeqCst) {
            return Err(ServerError::protocol(&self.name, "unexpected opcode"));
        }

        self.fill()?;
        let mut entries = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if line == "END" {
                self.completed = true;
                break;
            }
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| ServerError::protocol(&self.name, "malformed entry"))?;
            entries.push((key.to_string(), Bytes::from(value.to_string())));
        }
        Ok(entries)
    }

    fn multi_response_completed(&self) -> bool {
        self.completed
    }

    fn multi_response_abort(&mut self) {
        self.control.aborts.fetch_add(1, Ordering::SeqCst);
        // Discard whatever the aborted answer left behind.
        let _ = self.fill();
        self.buf.clear();
    }

    fn transport(&mut self) -> Option<&mut dyn Source> {
        self.conn.as_mut().map(|c| &mut c.ours as &mut dyn Source)
    }
}

/// Key manager that counts validations, i.e. how often keys were grouped.
pub struct CountingKeys {
    inner: NamespacedKeys,
    pub validations: AtomicUsize,
}

impl CountingKeys {
    pub fn new(namespace: Option<&str>) -> Self {
        Self {
            inner: NamespacedKeys::new(namespace),
            validations: AtomicUsize::new(0),
        }
    }
}

impl KeyManager for CountingKeys {
    fn validate_key(&self, raw: &str) -> Result<String, KeyError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.inner.validate_key(raw)
    }

    fn key_without_namespace<'a>(&self, key: &'a str) -> &'a str {
        self.inner.key_without_namespace(key)
    }
}

pub fn sample_keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("key-{}", i)).collect()
}

pub fn value_for(key: &str) -> Bytes {
    Bytes::from(format!("value-of-{}", key))
}

/// A cluster of fakes sharing one data set, stored under namespaced keys.
pub struct Cluster {
    pub ring: Ring<FakeServer>,
    pub controls: Vec<Arc<Control>>,
}

impl Cluster {
    pub fn new(servers: usize, options: RingOptions, keys: &dyn KeyManager, raw: &[String]) -> Self {
        let data: HashMap<String, Bytes> = raw
            .iter()
            .filter_map(|k| keys.validate_key(k).ok().map(|stored| (stored, value_for(k))))
            .collect();
        let data = Arc::new(data);

        let controls: Vec<Arc<Control>> = (0..servers).map(|_| Arc::new(Control::default())).collect();
        let specs: Vec<ServerSpec> = (0..servers)
            .map(|i| ServerSpec::unix(format!("/tmp/fake-memcached-{}.sock", i)))
            .collect();

        let mut next = controls.iter().cloned();
        let ring = Ring::new(specs, options, |spec| {
            let control = next.next().unwrap_or_default();
            FakeServer::new(spec.name(), Arc::clone(&data), control)
        });

        Self { ring, controls }
    }
}
