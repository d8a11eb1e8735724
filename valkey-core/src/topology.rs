//! Cluster topology: node addresses, slot ownership snapshots, and the
//! directory that refreshes and publishes them.
//!
//! A [`Topology`] is built wholesale from one `CLUSTER SLOTS` reply and is
//! never modified afterwards. [`TopologyDirectory`] holds the current
//! snapshot behind an `Arc` and replaces it in a single pointer swap, so a
//! reader that took a snapshot keeps routing against it even while a
//! refresh publishes a newer one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use resp_proto::{Request, SLOT_COUNT, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connection::{Connection, decode_replies, send_frame};
use crate::error::Error;
use crate::retry::RetryStrategy;

// ── NodeAddress ─────────────────────────────────────────────────────────

/// A node's `host:port`. Hostnames are kept as given; nothing is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // rsplit keeps IPv6 hosts like `::1:6379` intact.
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::Discovery(format!("address `{s}` has no port")))?;
        let port = port
            .parse()
            .map_err(|_| Error::Discovery(format!("address `{s}` has an invalid port")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(Error::Discovery(format!("address `{s}` has no host")));
        }
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NodeAddress> for String {
    fn from(addr: NodeAddress) -> Self {
        addr.to_string()
    }
}

// ── Topology ────────────────────────────────────────────────────────────

/// A contiguous, inclusive slot range with its primary and replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub start: u16,
    pub end: u16,
    pub primary: NodeAddress,
    pub replicas: Vec<NodeAddress>,
}

impl Shard {
    #[inline]
    pub fn contains(&self, slot: u16) -> bool {
        self.start <= slot && slot <= self.end
    }
}

/// An immutable slot-ownership snapshot.
///
/// Shards are sorted by start slot and never overlap, so every slot has at
/// most one primary. Slots outside every shard are gaps.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    epoch: u64,
    shards: Vec<Shard>,
}

impl Topology {
    /// An empty topology: every slot is a gap.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a topology from a `CLUSTER SLOTS` reply.
    ///
    /// Each entry is `[start, end, primary, replica...]`, each node
    /// `[host, port, id?, ...]`. Malformed entries, ranges outside the slot
    /// space, and overlapping ranges are rejected with [`Error::Discovery`].
    pub fn from_cluster_slots(value: &Value) -> Result<Self, Error> {
        Self::parse_cluster_slots(value, None)
    }

    /// Like [`from_cluster_slots`](Self::from_cluster_slots), substituting
    /// `reporter_host` for nodes listed with an empty host.
    fn parse_cluster_slots(value: &Value, reporter_host: Option<&str>) -> Result<Self, Error> {
        let entries = value
            .as_array()
            .ok_or_else(|| malformed("reply is not an array"))?;

        let mut shards = Vec::with_capacity(entries.len());
        for entry in entries {
            let items = entry
                .as_array()
                .ok_or_else(|| malformed("slot entry is not an array"))?;
            if items.len() < 3 {
                return Err(malformed("slot entry needs start, end and primary"));
            }
            let start = slot_value(&items[0])?;
            let end = slot_value(&items[1])?;
            if start > end {
                return Err(malformed(format!("slot range {start}-{end} is reversed")));
            }
            let primary = node_value(&items[2], reporter_host)?;
            let replicas = items[3..]
                .iter()
                .map(|item| node_value(item, reporter_host))
                .collect::<Result<Vec<_>, _>>()?;
            shards.push(Shard {
                start,
                end,
                primary,
                replicas,
            });
        }

        shards.sort_by_key(|s| s.start);
        for pair in shards.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(malformed(format!(
                    "slot ranges {}-{} and {}-{} overlap",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end
                )));
            }
        }

        Ok(Self { epoch: 0, shards })
    }

    /// Publication counter assigned by the directory; 0 if never published.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// The shard owning `slot`, if any.
    pub fn owner(&self, slot: u16) -> Option<&Shard> {
        let idx = self
            .shards
            .partition_point(|s| s.start <= slot)
            .checked_sub(1)?;
        let shard = &self.shards[idx];
        if shard.contains(slot) { Some(shard) } else { None }
    }

    /// The shard owning `slot`, or [`Error::TopologyGap`].
    pub fn lookup(&self, slot: u16) -> Result<&Shard, Error> {
        self.owner(slot).ok_or(Error::TopologyGap { slot })
    }

    /// Distinct primaries, in slot order.
    pub fn primaries(&self) -> Vec<&NodeAddress> {
        let mut out: Vec<&NodeAddress> = Vec::new();
        for shard in &self.shards {
            if !out.contains(&&shard.primary) {
                out.push(&shard.primary);
            }
        }
        out
    }

    /// Distinct primaries followed by distinct replicas.
    pub fn nodes(&self) -> Vec<&NodeAddress> {
        let mut out = self.primaries();
        for replica in self.shards.iter().flat_map(|s| &s.replicas) {
            if !out.contains(&replica) {
                out.push(replica);
            }
        }
        out
    }

    /// Whether `node` appears anywhere in this snapshot.
    pub fn contains_node(&self, node: &NodeAddress) -> bool {
        self.shards
            .iter()
            .any(|s| &s.primary == node || s.replicas.contains(node))
    }

    /// Whether every slot in `[0, SLOT_COUNT)` has an owner.
    pub fn is_fully_covered(&self) -> bool {
        let mut next: u32 = 0;
        for shard in &self.shards {
            if u32::from(shard.start) != next {
                return false;
            }
            next = u32::from(shard.end) + 1;
        }
        next == u32::from(SLOT_COUNT)
    }
}

fn malformed(msg: impl fmt::Display) -> Error {
    Error::Discovery(format!("malformed CLUSTER SLOTS reply: {msg}"))
}

fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(n) => Some(*n),
        Value::BulkString(s) | Value::SimpleString(s) => std::str::from_utf8(s).ok()?.parse().ok(),
        _ => None,
    }
}

fn slot_value(value: &Value) -> Result<u16, Error> {
    int_value(value)
        .and_then(|n| u16::try_from(n).ok())
        .filter(|&slot| slot < SLOT_COUNT)
        .ok_or_else(|| malformed("slot is not in range"))
}

fn node_value(value: &Value, reporter_host: Option<&str>) -> Result<NodeAddress, Error> {
    let items = value
        .as_array()
        .filter(|items| items.len() >= 2)
        .ok_or_else(|| malformed("node entry needs host and port"))?;
    let host = items[0]
        .as_bytes()
        .and_then(|b| std::str::from_utf8(b).ok())
        .ok_or_else(|| malformed("node host is not text"))?;
    let host = match (host, reporter_host) {
        ("", Some(fallback)) => fallback,
        ("", None) => return Err(malformed("node host is empty")),
        (host, _) => host,
    };
    let port = int_value(&items[1])
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| malformed("node port is not a valid port"))?;
    Ok(NodeAddress::new(host, port))
}

// ── TopologyDirectory ───────────────────────────────────────────────────

/// Holds the current [`Topology`] and refreshes it from the cluster.
///
/// Readers call [`snapshot`](Self::snapshot) and get an `Arc` they can use
/// for as long as they like. A refresh does its network I/O without any
/// lock held and takes the write lock only to swap the pointer.
pub struct TopologyDirectory {
    seeds: Vec<NodeAddress>,
    request_timeout: Option<Duration>,
    current: RwLock<Arc<Topology>>,
}

impl TopologyDirectory {
    /// A directory with an empty topology and the given seeds.
    pub fn new(seeds: Vec<NodeAddress>) -> Self {
        Self {
            seeds,
            request_timeout: None,
            current: RwLock::new(Arc::new(Topology::empty())),
        }
    }

    /// Bound each discovery query by `timeout`.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn seeds(&self) -> &[NodeAddress] {
        &self.seeds
    }

    /// The current snapshot.
    #[inline]
    pub fn snapshot(&self) -> Arc<Topology> {
        self.current.read().clone()
    }

    /// Stamp `topology` with the next epoch and make it current.
    pub fn publish(&self, mut topology: Topology) -> Arc<Topology> {
        let mut current = self.current.write();
        topology.epoch = current.epoch + 1;
        let topology = Arc::new(topology);
        *current = Arc::clone(&topology);
        topology
    }

    /// Refresh from the nodes of the current snapshot, then the seeds.
    pub async fn refresh<C: Connection>(&self, conn: &C) -> Result<Arc<Topology>, Error> {
        let current = self.snapshot();
        let mut candidates: Vec<NodeAddress> = current.nodes().into_iter().cloned().collect();
        for seed in &self.seeds {
            if !candidates.contains(seed) {
                candidates.push(seed.clone());
            }
        }
        self.refresh_from(conn, &candidates).await
    }

    /// Query `seeds` in order and publish the first usable topology.
    ///
    /// Fails with [`Error::Discovery`] only when every seed is unreachable
    /// or answers with unusable data; the current snapshot is left as is.
    pub async fn refresh_from<C: Connection>(
        &self,
        conn: &C,
        seeds: &[NodeAddress],
    ) -> Result<Arc<Topology>, Error> {
        if seeds.is_empty() {
            return Err(Error::Discovery("no seed addresses to query".into()));
        }

        let mut failures = Vec::with_capacity(seeds.len());
        for seed in seeds {
            match self.query(conn, seed).await {
                Ok(topology) => {
                    let topology = self.publish(topology);
                    info!(
                        seed = %seed,
                        epoch = topology.epoch(),
                        shards = topology.shards().len(),
                        primaries = topology.primaries().len(),
                        covered = topology.is_fully_covered(),
                        "topology refreshed"
                    );
                    return Ok(topology);
                }
                Err(e) => {
                    warn!(seed = %seed, error = %e, "topology discovery failed on seed");
                    failures.push(format!("{seed}: {e}"));
                }
            }
        }

        Err(Error::Discovery(format!(
            "no seed returned a usable topology ({})",
            failures.join("; ")
        )))
    }

    /// [`refresh`](Self::refresh), retried up to `retries` more times with
    /// the strategy's backoff between attempts.
    pub async fn refresh_with_retry<C: Connection>(
        &self,
        conn: &C,
        retries: u32,
        strategy: &RetryStrategy,
    ) -> Result<Arc<Topology>, Error> {
        let mut attempt = 0;
        loop {
            match self.refresh(conn).await {
                Ok(topology) => return Ok(topology),
                Err(e) if attempt < retries => {
                    let delay = strategy.delay(attempt);
                    debug!(attempt, ?delay, error = %e, "retrying topology refresh");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn query<C: Connection>(&self, conn: &C, node: &NodeAddress) -> Result<Topology, Error> {
        let mut frame = Vec::new();
        Request::cluster_slots().encode(&mut frame);

        let data = send_frame(conn, node, Bytes::from(frame), self.request_timeout).await?;
        let reply = decode_replies(node, &data, 1)?
            .pop()
            .ok_or_else(|| malformed("empty reply"))?;
        if let Some(msg) = reply.error_message() {
            return Err(Error::Discovery(format!(
                "CLUSTER SLOTS rejected: {}",
                String::from_utf8_lossy(msg)
            )));
        }
        let topology = Self::parse(&reply, node)?;
        if topology.is_empty() {
            return Err(Error::Discovery("node reports no slot ranges".into()));
        }
        Ok(topology)
    }

    fn parse(reply: &Value, reporter: &NodeAddress) -> Result<Topology, Error> {
        Topology::parse_cluster_slots(reply, Some(&reporter.host))
    }
}

impl fmt::Debug for TopologyDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyDirectory")
            .field("seeds", &self.seeds)
            .field("epoch", &self.current.read().epoch())
            .finish()
    }
}
