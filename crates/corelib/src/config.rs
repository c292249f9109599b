//! Client configuration: server specs and ring options.
//!
//! Server specs are written the way memcached clients conventionally accept
//! them: `host`, `host:port`, `host:port:weight`, `[::1]:port:weight`,
//! `/path/to.sock` or `/path/to.sock:weight`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Port used when a spec omits it.
pub const DEFAULT_PORT: u16 = 11211;

/// Points placed on the continuum per unit of weight.
pub const DEFAULT_POINTS_PER_SERVER: u32 = 160;

/// Environment variable consulted by [`ServerSpec::from_env`].
pub const SERVERS_ENV: &str = "MEMCACHE_SERVERS";

const DEFAULT_SERVERS: &str = "127.0.0.1:11211";

/// Where a server listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Address::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Address::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One configured server: an address plus its hash-space weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ServerSpec {
    address: Address,
    weight: u32,
}

impl ServerSpec {
    pub fn new(address: Address, weight: u32) -> Result<Self, ConfigError> {
        if weight == 0 {
            return Err(ConfigError::ZeroWeight(address.to_string()));
        }
        Ok(Self { address, weight })
    }

    /// TCP server with weight 1.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            address: Address::Tcp {
                host: host.into(),
                port,
            },
            weight: 1,
        }
    }

    /// Local socket server with weight 1.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self {
            address: Address::Unix(path.into()),
            weight: 1,
        }
    }

    pub fn with_weight(self, weight: u32) -> Result<Self, ConfigError> {
        Self::new(self.address, weight)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Identity hashed into the continuum. Excludes the weight so that
    /// re-weighting a server keeps its existing points.
    pub fn name(&self) -> String {
        self.address.to_string()
    }

    /// Parses a comma or whitespace separated list of specs.
    pub fn parse_list(list: &str) -> Result<Vec<ServerSpec>, ConfigError> {
        list.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }

    /// Reads `MEMCACHE_SERVERS`, falling back to `127.0.0.1:11211`.
    pub fn from_env() -> Result<Vec<ServerSpec>, ConfigError> {
        match std::env::var(SERVERS_ENV) {
            Ok(list) if !list.trim().is_empty() => Self::parse_list(&list),
            _ => Self::parse_list(DEFAULT_SERVERS),
        }
    }
}

impl fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.weight)
    }
}

fn invalid(spec: &str, reason: &'static str) -> ConfigError {
    ConfigError::InvalidServer {
        spec: spec.to_string(),
        reason,
    }
}

fn parse_port(spec: &str, port: &str) -> Result<u16, ConfigError> {
    port.parse().map_err(|_| invalid(spec, "bad port"))
}

fn parse_weight(spec: &str, weight: &str) -> Result<u32, ConfigError> {
    weight.parse().map_err(|_| invalid(spec, "bad weight"))
}

impl FromStr for ServerSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(invalid(s, "empty"));
        }

        if spec.starts_with('/') {
            // A trailing all-digit segment is a weight, anything else is part of the path.
            return match spec.rsplit_once(':') {
                Some((path, weight))
                    if !weight.is_empty() && weight.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    ServerSpec::new(Address::Unix(path.into()), parse_weight(spec, weight)?)
                }
                _ => Ok(ServerSpec::unix(spec)),
            };
        }

        let (host, rest) = if let Some(stripped) = spec.strip_prefix('[') {
            let (host, rest) = stripped
                .split_once(']')
                .ok_or_else(|| invalid(spec, "unterminated IPv6 literal"))?;
            let rest = match rest {
                "" => Vec::new(),
                r => r
                    .strip_prefix(':')
                    .ok_or_else(|| invalid(spec, "garbage after IPv6 literal"))?
                    .split(':')
                    .collect(),
            };
            (host, rest)
        } else {
            let mut parts = spec.split(':');
            let host = parts.next().unwrap_or_default();
            (host, parts.collect::<Vec<_>>())
        };

        if host.is_empty() {
            return Err(invalid(spec, "missing host"));
        }

        let (port, weight) = match rest.as_slice() {
            [] => (DEFAULT_PORT, 1),
            [port] => (parse_port(spec, port)?, 1),
            [port, weight] => (parse_port(spec, port)?, parse_weight(spec, weight)?),
            _ => return Err(invalid(spec, "too many segments")),
        };

        ServerSpec::new(
            Address::Tcp {
                host: host.to_string(),
                port,
            },
            weight,
        )
    }
}

impl TryFrom<String> for ServerSpec {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Deserializes a [`Duration`] written as integer milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Tunables of the [`Ring`](crate::ring::Ring).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RingOptions {
    /// How long a failed server is skipped before a reconnect is attempted.
    #[serde(rename = "down_retry_delay_ms", with = "duration_ms")]
    pub down_retry_delay: Duration,
    /// Walk past unavailable servers instead of failing the lookup.
    pub failover: bool,
    /// Continuum points per unit of weight.
    pub points_per_server: u32,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self {
            down_retry_delay: Duration::from_secs(30),
            failover: true,
            points_per_server: DEFAULT_POINTS_PER_SERVER,
        }
    }
}

/// Everything needed to build a ring and a key manager.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub servers: Vec<ServerSpec>,
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub ring: RingOptions,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Configured servers, or the environment default when none were given.
    pub fn resolved_servers(&self) -> Result<Vec<ServerSpec>, ConfigError> {
        if self.servers.is_empty() {
            ServerSpec::from_env()
        } else {
            Ok(self.servers.clone())
        }
    }
}
