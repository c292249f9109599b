//! Builder for [`Ring`].

use std::time::Duration;

use crate::config::{RingOptions, ServerSpec};
use crate::partitioner::{Partitioner, Xxh3Partitioner};
use crate::server::Server;

use super::ring::{Member, Ring, RingState};

/// Incrementally assembles a ring.
///
/// ```ignore
/// let ring = RingBuilder::new()
///     .with_points(40)
///     .with_down_retry_delay(Duration::from_secs(5))
///     .add_server("10.0.0.1:11211".parse()?, conn_a)
///     .add_server("10.0.0.2:11211:2".parse()?, conn_b)
///     .build();
/// ```
pub struct RingBuilder<S> {
    options: RingOptions,
    partitioner: Box<dyn Partitioner>,
    servers: Vec<(ServerSpec, S)>,
}

impl<S: Server> RingBuilder<S> {
    pub fn new() -> Self {
        Self {
            options: RingOptions::default(),
            partitioner: Box::new(Xxh3Partitioner),
            servers: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: RingOptions) -> Self {
        self.options = options;
        self
    }

    /// Continuum points per unit of weight (clamped to at least 1).
    pub fn with_points(mut self, points_per_server: u32) -> Self {
        self.options.points_per_server = points_per_server;
        self
    }

    pub fn with_down_retry_delay(mut self, delay: Duration) -> Self {
        self.options.down_retry_delay = delay;
        self
    }

    pub fn with_failover(mut self, failover: bool) -> Self {
        self.options.failover = failover;
        self
    }

    pub fn with_partitioner(mut self, partitioner: impl Partitioner) -> Self {
        self.partitioner = Box::new(partitioner);
        self
    }

    pub fn add_server(mut self, spec: ServerSpec, server: S) -> Self {
        self.servers.push((spec, server));
        self
    }

    pub fn build(self) -> Ring<S> {
        let mut options = self.options;
        options.points_per_server = options.points_per_server.max(1);

        let members = self
            .servers
            .into_iter()
            .map(|(spec, server)| Member::new(spec, server, &options))
            .collect();

        Ring::from_state(RingState::new(members, self.partitioner, options))
    }
}

impl<S: Server> Default for RingBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
