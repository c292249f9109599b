//! The continuum: weighted points of every server, sorted by token.
//!
//! Each server contributes `weight × points_per_server` points. A point's
//! token is the hash of `"{name}:{index}"`, so the layout depends only on
//! the configured names and weights and every client agrees on it.
//!
//! # Performance
//!
//! - **Build**: O(p log p) where p = total points
//! - **Lookup**: O(log p) binary search, then a short walk when servers are down

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::ServerSpec;
use crate::partitioner::Partitioner;
use crate::server::ServerId;
use crate::token::Token;

/// One point on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContinuumEntry {
    pub token: Token,
    pub server: ServerId,
}

impl ContinuumEntry {
    #[inline]
    pub fn new(token: Token, server: ServerId) -> Self {
        Self { token, server }
    }

    /// Hashes the identifier of point `index` of the server named `name`.
    pub fn from_index(
        partitioner: &dyn Partitioner,
        name: &str,
        index: u32,
        server: ServerId,
    ) -> Self {
        let point_key = format!("{}:{}", name, index);
        Self::new(partitioner.partition(point_key.as_bytes()), server)
    }
}

impl std::fmt::Display for ContinuumEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Point(token={}, server={})", self.token, self.server)
    }
}

/// Strictly ascending sequence of points. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct Continuum {
    entries: Vec<ContinuumEntry>,
}

impl Continuum {
    pub fn build(
        specs: &[ServerSpec],
        points_per_server: u32,
        partitioner: &dyn Partitioner,
    ) -> Self {
        let total: usize = specs
            .iter()
            .map(|s| s.weight() as usize * points_per_server as usize)
            .sum();
        let mut entries = Vec::with_capacity(total);
        let mut seen = HashSet::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            let name = spec.name();
            if !seen.insert(name.clone()) {
                // Same name, same tokens: every point collides with the
                // first server of that name.
                warn!(
                    server = %name,
                    id = %ServerId(i),
                    "duplicate server name, it will receive no keys"
                );
            }
            let points = spec.weight().saturating_mul(points_per_server);
            entries.extend(
                (0..points).map(|index| ContinuumEntry::from_index(partitioner, &name, index, ServerId(i))),
            );
        }

        entries.sort_unstable();
        let before = entries.len();
        entries.dedup_by_key(|e| e.token);
        if entries.len() != before {
            debug!(collisions = before - entries.len(), "dropped colliding continuum points");
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ContinuumEntry] {
        &self.entries
    }

    /// Index of the first point with token >= `token`, wrapping to 0.
    pub fn position(&self, token: Token) -> usize {
        let idx = self.entries.partition_point(|e| e.token < token);
        if idx == self.entries.len() {
            0
        } else {
            idx
        }
    }

    /// Every point clockwise from `start`, wrapping once around the ring.
    pub fn walk(&self, start: usize) -> impl Iterator<Item = &ContinuumEntry> + '_ {
        let (before, after) = self.entries.split_at(start.min(self.entries.len()));
        after.iter().chain(before.iter())
    }
}
