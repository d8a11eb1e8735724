//! Client configuration.
//!
//! The core reads `addresses`, `read_from`, `retry_strategy`,
//! `request_timeout`, `topology_refresh_retries` and `max_redirects`. The
//! remaining fields belong to the [`Connection`](crate::Connection)
//! implementation and pass through untouched.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryStrategy;
use crate::topology::NodeAddress;

/// Maximum number of MOVED/ASK hops for one command before giving up.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Which node serves read-only commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFrom {
    /// Always the slot's primary.
    #[default]
    Primary,
    /// The slot's replicas in rotation, or the primary if it has none.
    PreferReplica,
    /// A random replica of the slot, or the primary if it has none.
    RandomReplica,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    Resp2,
    #[default]
    Resp3,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings fixed at client construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// The standalone node, or the cluster's seed nodes.
    pub addresses: Vec<NodeAddress>,
    pub client_name: Option<String>,
    pub use_tls: bool,
    #[serde(with = "millis")]
    pub connection_timeout: Duration,
    /// Deadline for each request frame; `None` waits indefinitely.
    #[serde(with = "opt_millis")]
    pub request_timeout: Option<Duration>,
    pub database_id: i64,
    pub retry_strategy: RetryStrategy,
    pub credentials: Option<Credentials>,
    pub protocol: ProtocolVersion,
    pub read_from: ReadFrom,
    /// Extra discovery attempts before a refresh failure is surfaced.
    pub topology_refresh_retries: u32,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            client_name: None,
            use_tls: false,
            connection_timeout: Duration::from_millis(250),
            request_timeout: None,
            database_id: 0,
            retry_strategy: RetryStrategy::default(),
            credentials: None,
            protocol: ProtocolVersion::default(),
            read_from: ReadFrom::default(),
            topology_refresh_retries: 2,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given addresses.
    pub fn new(addresses: Vec<NodeAddress>) -> Self {
        Self {
            addresses,
            ..Self::default()
        }
    }

    pub fn read_from(mut self, read_from: ReadFrom) -> Self {
        self.read_from = read_from;
        self
    }

    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
