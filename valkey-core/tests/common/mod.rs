//! In-memory Valkey stand-in for integration tests.
//!
//! `FakeValkey` implements `Connection`. It decodes real RESP request
//! frames, applies them to one shared keyspace, and answers with real RESP
//! replies. In cluster mode each node checks slot ownership the way a
//! cluster node would and answers `MOVED`, `ASK` or `CROSSSLOT`.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use resp_proto::{Value, hash_slot};
use valkey_core::{Cmd, Connection, ConnectionError, ConnectionErrorKind, NodeAddress, TypedValue};

pub fn addr(port: u16) -> NodeAddress {
    NodeAddress::new("127.0.0.1", port)
}

#[derive(Debug, Clone)]
pub struct FakeShard {
    pub start: u16,
    pub end: u16,
    pub primary: NodeAddress,
    pub replicas: Vec<NodeAddress>,
}

/// Three primaries on ports 7000-7002, each with one replica on 7003-7005.
pub fn three_shards() -> Vec<FakeShard> {
    vec![
        FakeShard {
            start: 0,
            end: 5460,
            primary: addr(7000),
            replicas: vec![addr(7003)],
        },
        FakeShard {
            start: 5461,
            end: 10922,
            primary: addr(7001),
            replicas: vec![addr(7004)],
        },
        FakeShard {
            start: 10923,
            end: 16383,
            primary: addr(7002),
            replicas: vec![addr(7005)],
        },
    ]
}

enum Entry {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Set(BTreeSet<Bytes>),
    ZSet(Vec<(f64, Bytes)>),
}

#[derive(Default)]
struct Faults {
    down: HashMap<NodeAddress, ConnectionErrorKind>,
    fail_next: HashMap<NodeAddress, u32>,
    slots_reply: HashMap<NodeAddress, Value>,
    forward: HashMap<NodeAddress, NodeAddress>,
    migrating: HashMap<u16, NodeAddress>,
}

pub struct FakeValkey {
    cluster: bool,
    shards: Mutex<Vec<FakeShard>>,
    extra_nodes: Vec<NodeAddress>,
    store: Mutex<HashMap<Bytes, Entry>>,
    faults: Mutex<Faults>,
    log: Mutex<Vec<(NodeAddress, String)>>,
    frames: AtomicUsize,
    bytes: AtomicUsize,
}

/// Per-frame connection state.
#[derive(Default)]
struct Session {
    queued: Option<Vec<Vec<Bytes>>>,
    dirty: bool,
    asking: bool,
}

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

impl FakeValkey {
    pub fn standalone(node: NodeAddress) -> Self {
        Self::build(false, Vec::new(), vec![node])
    }

    pub fn cluster(shards: Vec<FakeShard>) -> Self {
        Self::build(true, shards, Vec::new())
    }

    fn build(cluster: bool, shards: Vec<FakeShard>, extra_nodes: Vec<NodeAddress>) -> Self {
        Self {
            cluster,
            shards: Mutex::new(shards),
            extra_nodes,
            store: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            log: Mutex::new(Vec::new()),
            frames: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    // ── Fault injection and inspection ──────────────────────────────────

    pub fn set_down(&self, node: &NodeAddress, kind: ConnectionErrorKind) {
        self.faults.lock().down.insert(node.clone(), kind);
    }

    pub fn fail_next(&self, node: &NodeAddress, times: u32) {
        self.faults.lock().fail_next.insert(node.clone(), times);
    }

    pub fn set_slots_reply(&self, node: &NodeAddress, reply: Value) {
        self.faults.lock().slots_reply.insert(node.clone(), reply);
    }

    /// `from` answers every keyed command with `MOVED` to `to`.
    pub fn forward(&self, from: &NodeAddress, to: &NodeAddress) {
        self.faults.lock().forward.insert(from.clone(), to.clone());
    }

    /// The slot's owner answers `ASK` to `target`.
    pub fn migrate(&self, slot: u16, target: &NodeAddress) {
        self.faults.lock().migrating.insert(slot, target.clone());
    }

    /// Reassign slots `start..=end` to `owner`, as a completed migration.
    pub fn reassign(&self, start: u16, end: u16, owner: &NodeAddress) {
        let mut shards = self.shards.lock();
        let mut next = Vec::new();
        for shard in shards.drain(..) {
            if shard.end < start || shard.start > end {
                next.push(shard);
                continue;
            }
            if shard.start < start {
                next.push(FakeShard {
                    end: start - 1,
                    ..shard.clone()
                });
            }
            if shard.end > end {
                next.push(FakeShard {
                    start: end + 1,
                    ..shard.clone()
                });
            }
        }
        next.push(FakeShard {
            start,
            end,
            primary: owner.clone(),
            replicas: Vec::new(),
        });
        next.sort_by_key(|s| s.start);
        *shards = next;
    }

    pub fn frames_sent(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Every command received, in arrival order.
    pub fn log(&self) -> Vec<(NodeAddress, String)> {
        self.log.lock().clone()
    }

    /// Nodes that received a command named `name`.
    pub fn nodes_that_ran(&self, name: &str) -> Vec<NodeAddress> {
        self.log
            .lock()
            .iter()
            .filter(|(_, n)| n == name)
            .map(|(node, _)| node.clone())
            .collect()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    // ── Request handling ────────────────────────────────────────────────

    fn is_known(&self, node: &NodeAddress) -> bool {
        self.extra_nodes.contains(node)
            || self
                .shards
                .lock()
                .iter()
                .any(|s| &s.primary == node || s.replicas.contains(node))
    }

    fn handle_frame(&self, node: &NodeAddress, frame: &[u8]) -> Result<Bytes, ConnectionError> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(frame.len(), Ordering::SeqCst);

        {
            let mut faults = self.faults.lock();
            if let Some(kind) = faults.down.get(node) {
                return Err(ConnectionError::new(*kind, format!("{node} is down")));
            }
            if let Some(left) = faults.fail_next.get_mut(node)
                && *left > 0
            {
                *left -= 1;
                return Err(ConnectionError::new(
                    ConnectionErrorKind::Io,
                    "connection reset",
                ));
            }
        }
        if !self.is_known(node) {
            return Err(ConnectionError::new(
                ConnectionErrorKind::Refused,
                format!("nothing listens on {node}"),
            ));
        }

        let mut session = Session::default();
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < frame.len() {
            let (request, used) = Value::parse(&frame[offset..])
                .map_err(|e| ConnectionError::new(ConnectionErrorKind::Io, e.to_string()))?;
            offset += used;
            let args: Vec<Bytes> = request
                .as_array()
                .unwrap_or_default()
                .iter()
                .filter_map(|v| v.as_bytes().map(Bytes::copy_from_slice))
                .collect();
            self.process(node, &mut session, args).encode(&mut out);
        }
        Ok(Bytes::from(out))
    }

    fn process(&self, node: &NodeAddress, session: &mut Session, args: Vec<Bytes>) -> Value {
        let name = args
            .first()
            .map(|n| String::from_utf8_lossy(n).to_ascii_uppercase())
            .unwrap_or_default();
        self.log.lock().push((node.clone(), name.clone()));

        let asking = std::mem::take(&mut session.asking);
        match name.as_str() {
            "ASKING" => {
                session.asking = true;
                return Value::ok();
            }
            "MULTI" => {
                session.queued = Some(Vec::new());
                session.dirty = false;
                return Value::ok();
            }
            "EXEC" => {
                let Some(queued) = session.queued.take() else {
                    return Value::error("ERR EXEC without MULTI");
                };
                if session.dirty {
                    return Value::error(
                        "EXECABORT Transaction discarded because of previous errors.",
                    );
                }
                let mut store = self.store.lock();
                return Value::Array(
                    queued
                        .iter()
                        .map(|cmd| self.apply(node, &mut store, cmd))
                        .collect(),
                );
            }
            _ => {}
        }

        if let Some(rejection) = self.check(node, &name, &args, asking) {
            if session.queued.is_some() {
                session.dirty = true;
            }
            return rejection;
        }

        if let Some(queued) = session.queued.as_mut() {
            queued.push(args);
            return Value::simple("QUEUED");
        }
        let mut store = self.store.lock();
        self.apply(node, &mut store, &args)
    }

    /// Errors raised before a command runs: unknown names and, in cluster
    /// mode, slot ownership.
    fn check(&self, node: &NodeAddress, name: &str, args: &[Bytes], asking: bool) -> Option<Value> {
        const KNOWN: &[&str] = &[
            "PING", "SET", "GET", "INCR", "INCRBY", "DEL", "LPUSH", "RPUSH", "LRANGE", "SADD",
            "SMEMBERS", "ZADD", "ZRANGE", "INFO", "DBSIZE", "MGET", "CLUSTER",
        ];
        if !KNOWN.contains(&name) {
            return Some(Value::error(format!(
                "ERR unknown command '{}'",
                name.to_ascii_lowercase()
            )));
        }
        if !self.cluster {
            return None;
        }

        let parts = args.iter().cloned().map(TypedValue::from).collect();
        let cmd = Cmd::from_parts(parts).ok()?;
        let keys = cmd.keys();
        let slot = hash_slot(keys.first()?);
        if keys.iter().any(|k| hash_slot(k) != slot) {
            return Some(Value::error(
                "CROSSSLOT Keys in request don't hash to the same slot",
            ));
        }

        let faults = self.faults.lock();
        if let Some(to) = faults.forward.get(node) {
            return Some(Value::error(format!("MOVED {slot} {to}")));
        }
        let shards = self.shards.lock();
        let Some(shard) = shards.iter().find(|s| s.start <= slot && slot <= s.end) else {
            return Some(Value::error("CLUSTERDOWN Hash slot not served"));
        };
        if let Some(target) = faults.migrating.get(&slot) {
            if node == target && asking {
                return None;
            }
            if node == &shard.primary {
                return Some(Value::error(format!("ASK {slot} {target}")));
            }
        }
        if node != &shard.primary && !shard.replicas.contains(node) {
            return Some(Value::error(format!("MOVED {slot} {}", shard.primary)));
        }
        None
    }

    fn cluster_slots(&self, node: &NodeAddress) -> Value {
        if !self.cluster {
            return Value::error("ERR This instance has cluster support disabled");
        }
        if let Some(reply) = self.faults.lock().slots_reply.get(node) {
            return reply.clone();
        }
        let describe = |n: &NodeAddress| {
            Value::Array(vec![
                Value::bulk(n.host.clone()),
                Value::Integer(i64::from(n.port)),
                Value::bulk(format!("id-{}", n.port)),
            ])
        };
        Value::Array(
            self.shards
                .lock()
                .iter()
                .map(|s| {
                    let mut entry = vec![
                        Value::Integer(i64::from(s.start)),
                        Value::Integer(i64::from(s.end)),
                        describe(&s.primary),
                    ];
                    entry.extend(s.replicas.iter().map(describe));
                    Value::Array(entry)
                })
                .collect(),
        )
    }

    fn apply(&self, node: &NodeAddress, store: &mut HashMap<Bytes, Entry>, args: &[Bytes]) -> Value {
        let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
        let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
        let int = |i: usize| {
            std::str::from_utf8(&arg(i))
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
        };

        match name.as_str() {
            "PING" => Value::simple("PONG"),
            "CLUSTER" => self.cluster_slots(node),
            "INFO" => Value::bulk(format!("# Server\r\nnode:{node}\r\n")),
            "DBSIZE" => Value::Integer(store.len() as i64),
            "SET" => {
                let key = arg(1);
                let flags: Vec<String> = args
                    .get(3..)
                    .unwrap_or_default()
                    .iter()
                    .map(|a| String::from_utf8_lossy(a).to_ascii_uppercase())
                    .collect();
                let exists = store.contains_key(&key);
                if (flags.iter().any(|f| f == "NX") && exists)
                    || (flags.iter().any(|f| f == "XX") && !exists)
                {
                    return Value::Null;
                }
                store.insert(key, Entry::Str(arg(2)));
                Value::ok()
            }
            "GET" => match store.get(&arg(1)) {
                None => Value::Null,
                Some(Entry::Str(v)) => Value::BulkString(v.clone()),
                Some(_) => Value::error(WRONGTYPE),
            },
            "MGET" => Value::Array(
                args[1..]
                    .iter()
                    .map(|k| match store.get(k) {
                        Some(Entry::Str(v)) => Value::BulkString(v.clone()),
                        _ => Value::Null,
                    })
                    .collect(),
            ),
            "INCR" | "INCRBY" => {
                let delta = if name == "INCR" { Some(1) } else { int(2) };
                let Some(delta) = delta else {
                    return Value::error("ERR value is not an integer or out of range");
                };
                let current = match store.get(&arg(1)) {
                    None => 0,
                    Some(Entry::Str(v)) => {
                        match std::str::from_utf8(v).ok().and_then(|s| s.parse().ok()) {
                            Some(n) => n,
                            None => {
                                return Value::error("ERR value is not an integer or out of range");
                            }
                        }
                    }
                    Some(_) => return Value::error(WRONGTYPE),
                };
                let next: i64 = current + delta;
                store.insert(arg(1), Entry::Str(Bytes::from(next.to_string())));
                Value::Integer(next)
            }
            "DEL" => {
                let removed = args[1..].iter().filter(|k| store.remove(*k).is_some()).count();
                Value::Integer(removed as i64)
            }
            "LPUSH" | "RPUSH" => {
                let entry = store
                    .entry(arg(1))
                    .or_insert_with(|| Entry::List(VecDeque::new()));
                let Entry::List(list) = entry else {
                    return Value::error(WRONGTYPE);
                };
                for value in &args[2..] {
                    if name == "LPUSH" {
                        list.push_front(value.clone());
                    } else {
                        list.push_back(value.clone());
                    }
                }
                Value::Integer(list.len() as i64)
            }
            "LRANGE" => match store.get(&arg(1)) {
                None => Value::Array(Vec::new()),
                Some(Entry::List(list)) => {
                    let items: Vec<Bytes> = list.iter().cloned().collect();
                    Value::Array(
                        window(&items, int(2).unwrap_or(0), int(3).unwrap_or(-1))
                            .iter()
                            .cloned()
                            .map(Value::BulkString)
                            .collect(),
                    )
                }
                Some(_) => Value::error(WRONGTYPE),
            },
            "SADD" => {
                let entry = store
                    .entry(arg(1))
                    .or_insert_with(|| Entry::Set(BTreeSet::new()));
                let Entry::Set(set) = entry else {
                    return Value::error(WRONGTYPE);
                };
                let added = args[2..].iter().filter(|m| set.insert((*m).clone())).count();
                Value::Integer(added as i64)
            }
            "SMEMBERS" => match store.get(&arg(1)) {
                None => Value::Set(Vec::new()),
                Some(Entry::Set(set)) => {
                    Value::Set(set.iter().cloned().map(Value::BulkString).collect())
                }
                Some(_) => Value::error(WRONGTYPE),
            },
            "ZADD" => {
                let entry = store.entry(arg(1)).or_insert_with(|| Entry::ZSet(Vec::new()));
                let Entry::ZSet(zset) = entry else {
                    return Value::error(WRONGTYPE);
                };
                let mut added = 0;
                for pair in args[2..].chunks(2) {
                    let [score, member] = pair else {
                        return Value::error("ERR syntax error");
                    };
                    let Some(score) = parse_score(score) else {
                        return Value::error("ERR value is not a valid float");
                    };
                    match zset.iter_mut().find(|(_, m)| m == member) {
                        Some(existing) => existing.0 = score,
                        None => {
                            zset.push((score, member.clone()));
                            added += 1;
                        }
                    }
                }
                zset.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                Value::Integer(added)
            }
            "ZRANGE" => match store.get(&arg(1)) {
                None => Value::Array(Vec::new()),
                Some(Entry::ZSet(zset)) => {
                    let members: Vec<Bytes> = zset.iter().map(|(_, m)| m.clone()).collect();
                    Value::Array(
                        window(&members, int(2).unwrap_or(0), int(3).unwrap_or(-1))
                            .iter()
                            .cloned()
                            .map(Value::BulkString)
                            .collect(),
                    )
                }
                Some(_) => Value::error(WRONGTYPE),
            },
            other => Value::error(format!("ERR unknown command '{other}'")),
        }
    }
}

fn parse_score(raw: &[u8]) -> Option<f64> {
    match std::str::from_utf8(raw).ok()? {
        "+inf" | "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        s => s.parse().ok(),
    }
}

/// Inclusive `start..=stop` with negative indices counted from the end.
fn window<T>(items: &[T], start: i64, stop: i64) -> &[T] {
    let len = items.len() as i64;
    let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    let (start, stop) = (norm(start), norm(stop).min(len - 1));
    if len == 0 || start > stop {
        return &[];
    }
    &items[start as usize..=stop as usize]
}

impl Connection for FakeValkey {
    fn send(
        &self,
        node: &NodeAddress,
        frame: Bytes,
    ) -> impl Future<Output = Result<Bytes, ConnectionError>> + Send {
        std::future::ready(self.handle_frame(node, &frame))
    }
}

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
