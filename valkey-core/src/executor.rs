//! Batch execution and reply demultiplexing.
//!
//! A non-atomic batch against a cluster is split per destination node. Each
//! node gets one pipelined frame, the frames go out concurrently, and every
//! reply is put back at the position of the command that produced it.
//! Atomic batches are framed as `MULTI` ... `EXEC` and sent to one node.
//!
//! Failures are split in two. A server rejecting one command is that
//! position's [`Outcome`]; everything else (transport, discovery, a batch
//! that cannot be routed) fails the whole call with [`Error`] and produces
//! no partial result.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use resp_proto::{ParseError, Redirect, RedirectKind, Request, Value, hash_slot, parse_redirect};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, debug_span, warn};

use crate::batch::Batch;
use crate::cmd::Cmd;
use crate::config::ClientConfig;
use crate::connection::{Connection, decode_replies, send_frame};
use crate::error::{ConnectionError, ConnectionErrorKind, Error, ServerError};
use crate::routing::{Route, Router, RoutingTarget};
use crate::topology::{NodeAddress, Topology, TopologyDirectory};

/// One command's result: its reply, or the server's rejection of it.
pub type Outcome = Result<Value, ServerError>;

// ── ClientContext ───────────────────────────────────────────────────────

enum Mode {
    Standalone(NodeAddress),
    Cluster(TopologyDirectory),
}

/// Per-client state shared by every call: configuration, the router and,
/// in cluster mode, the topology directory.
pub struct ClientContext {
    config: ClientConfig,
    router: Router,
    mode: Mode,
}

impl ClientContext {
    /// A context for a single node, the first configured address.
    pub fn standalone(config: ClientConfig) -> Result<Self, Error> {
        let node = config
            .addresses
            .first()
            .cloned()
            .ok_or_else(|| Error::Discovery("no address configured".into()))?;
        Ok(Self {
            router: Router::new(config.read_from),
            mode: Mode::Standalone(node),
            config,
        })
    }

    /// A cluster context seeded with the configured addresses. The
    /// topology is discovered on first use.
    pub fn cluster(config: ClientConfig) -> Self {
        let directory = TopologyDirectory::new(config.addresses.clone())
            .with_request_timeout(config.request_timeout);
        Self {
            router: Router::new(config.read_from),
            mode: Mode::Cluster(directory),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The topology directory; `None` in standalone mode.
    pub fn directory(&self) -> Option<&TopologyDirectory> {
        match &self.mode {
            Mode::Cluster(directory) => Some(directory),
            Mode::Standalone(_) => None,
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.mode, Mode::Cluster(_))
    }
}

// ── BatchExecutor ───────────────────────────────────────────────────────

/// Runs batches over a [`Connection`].
///
/// `execute` takes `&self`; any number of calls may run at once, each with
/// its own batch and result.
pub struct BatchExecutor<C> {
    conn: Arc<C>,
    ctx: Arc<ClientContext>,
}

impl<C> Clone for BatchExecutor<C> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<C: Connection + 'static> BatchExecutor<C> {
    pub fn new(conn: Arc<C>, ctx: Arc<ClientContext>) -> Self {
        Self { conn, ctx }
    }

    /// An executor for one standalone node.
    pub fn standalone(conn: C, config: ClientConfig) -> Result<Self, Error> {
        Ok(Self::new(
            Arc::new(conn),
            Arc::new(ClientContext::standalone(config)?),
        ))
    }

    /// An executor for a cluster reached through the configured seeds.
    pub fn cluster(conn: C, config: ClientConfig) -> Self {
        Self::new(Arc::new(conn), Arc::new(ClientContext::cluster(config)))
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.ctx
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// Rediscover the cluster topology now. Standalone clients have none.
    pub async fn refresh_topology(&self) -> Result<Arc<Topology>, Error> {
        match &self.ctx.mode {
            Mode::Cluster(directory) => self.refresh(directory).await,
            Mode::Standalone(_) => Err(Error::Discovery(
                "standalone client has no cluster topology".into(),
            )),
        }
    }

    /// Execute `batch` and return one outcome per command, in order.
    ///
    /// `route` picks the destination of keyless commands in cluster mode
    /// (a random primary when `None`); it is ignored for standalone
    /// clients and for commands that carry a key.
    pub async fn execute(
        &self,
        batch: &Batch,
        route: Option<Route>,
    ) -> Result<Vec<Outcome>, Error> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let span = debug_span!(
            "execute",
            commands = batch.len(),
            atomic = batch.is_atomic(),
            cluster = self.ctx.is_cluster()
        );
        async {
            let cmds = batch.commands();
            match (&self.ctx.mode, batch.is_atomic()) {
                (Mode::Standalone(node), false) => self.pipeline(node, cmds).await,
                (Mode::Standalone(node), true) => {
                    let replies = self.transaction(node, cmds).await?;
                    spread_exec(replies, cmds.len())
                }
                (Mode::Cluster(directory), false) => {
                    self.cluster_pipeline(directory, cmds, route.as_ref()).await
                }
                (Mode::Cluster(directory), true) => {
                    self.cluster_transaction(directory, cmds, route.as_ref()).await
                }
            }
        }
        .instrument(span)
        .await
    }

    // ── Standalone ──────────────────────────────────────────────────────

    async fn pipeline(&self, node: &NodeAddress, cmds: &[Cmd]) -> Result<Vec<Outcome>, Error> {
        let mut buf = Vec::new();
        for cmd in cmds {
            cmd.encode(&mut buf);
        }
        let replies = exchange(&*self.conn, node, Bytes::from(buf), cmds.len(), &self.ctx.config)
            .await?;
        Ok(replies.into_iter().map(outcome).collect())
    }

    /// Send `MULTI`, the commands and `EXEC` as one frame. Returns all
    /// `cmds.len() + 2` replies.
    async fn transaction(&self, node: &NodeAddress, cmds: &[Cmd]) -> Result<Vec<Value>, Error> {
        let mut buf = Vec::new();
        Request::multi().encode(&mut buf);
        for cmd in cmds {
            cmd.encode(&mut buf);
        }
        Request::exec().encode(&mut buf);
        exchange(&*self.conn, node, Bytes::from(buf), cmds.len() + 2, &self.ctx.config).await
    }

    // ── Cluster ─────────────────────────────────────────────────────────

    async fn refresh(&self, directory: &TopologyDirectory) -> Result<Arc<Topology>, Error> {
        directory
            .refresh_with_retry(
                &*self.conn,
                self.ctx.config.topology_refresh_retries,
                &self.ctx.config.retry_strategy,
            )
            .await
    }

    /// The current snapshot, discovering the cluster first if nothing has
    /// been published yet.
    async fn topology(&self, directory: &TopologyDirectory) -> Result<Arc<Topology>, Error> {
        let topology = directory.snapshot();
        if topology.is_empty() {
            return self.refresh(directory).await;
        }
        Ok(topology)
    }

    /// Route every command against one snapshot.
    fn plan(
        &self,
        topology: &Topology,
        cmds: &[Cmd],
        hint: Option<&Route>,
    ) -> Result<Vec<Dispatch>, Error> {
        let router = &self.ctx.router;
        cmds.iter()
            .map(|cmd| {
                let target = router.route(topology, cmd, hint)?;
                let nodes = router.resolve(topology, &target)?;
                Ok(Dispatch { target, nodes })
            })
            .collect()
    }

    async fn cluster_pipeline(
        &self,
        directory: &TopologyDirectory,
        cmds: &[Cmd],
        hint: Option<&Route>,
    ) -> Result<Vec<Outcome>, Error> {
        let mut topology = self.topology(directory).await?;
        let plan = match self.plan(&topology, cmds, hint) {
            Err(Error::TopologyGap { slot }) => {
                debug!(slot, "slot has no owner, refreshing before routing again");
                topology = self.refresh(directory).await?;
                self.plan(&topology, cmds, hint)?
            }
            other => other?,
        };

        // Group positions by destination, remembering where each reply
        // will sit in its node's reply list.
        let mut groups: Vec<(NodeAddress, Vec<u8>, usize)> = Vec::new();
        let mut group_of: HashMap<NodeAddress, usize> = HashMap::new();
        let mut placements: Vec<Vec<(usize, usize)>> = Vec::with_capacity(cmds.len());
        for (cmd, dispatch) in cmds.iter().zip(&plan) {
            let mut placed = Vec::with_capacity(dispatch.nodes.len());
            for node in &dispatch.nodes {
                let g = *group_of.entry(node.clone()).or_insert_with(|| {
                    groups.push((node.clone(), Vec::new(), 0));
                    groups.len() - 1
                });
                let (_, buf, count) = &mut groups[g];
                cmd.encode(buf);
                placed.push((g, *count));
                *count += 1;
            }
            placements.push(placed);
        }
        debug!(nodes = groups.len(), epoch = topology.epoch(), "dispatching pipeline");

        let nodes: Vec<NodeAddress> = groups.iter().map(|(node, _, _)| node.clone()).collect();
        let mut replies: Vec<Vec<Option<Value>>> = self
            .dispatch(groups)
            .await?
            .into_iter()
            .map(|group| group.into_iter().map(Some).collect())
            .collect();

        let mut refreshed = false;
        let mut outcomes = Vec::with_capacity(cmds.len());
        for ((cmd, dispatch), placed) in cmds.iter().zip(&plan).zip(placements) {
            let mut taken = placed
                .into_iter()
                .map(|(g, i)| (g, replies[g][i].take().unwrap_or(Value::Null)));

            if dispatch.target.is_multi_node() {
                outcomes.push(aggregate(taken.map(|(g, reply)| (&nodes[g], reply))));
                continue;
            }

            let reply = taken.next().map(|(_, reply)| reply).unwrap_or(Value::Null);
            match parse_redirect(&reply) {
                Some(redirect) => {
                    let outcome = self
                        .follow_redirect(directory, &topology, cmd, redirect, &mut refreshed)
                        .await?;
                    outcomes.push(outcome);
                }
                None => outcomes.push(outcome(reply)),
            }
        }
        Ok(outcomes)
    }

    /// Send each node its frame concurrently. Any failure fails the call
    /// and aborts the requests still in flight.
    async fn dispatch(
        &self,
        mut groups: Vec<(NodeAddress, Vec<u8>, usize)>,
    ) -> Result<Vec<Vec<Value>>, Error> {
        if groups.len() == 1
            && let Some((node, buf, count)) = groups.pop()
        {
            let replies =
                exchange(&*self.conn, &node, Bytes::from(buf), count, &self.ctx.config).await?;
            return Ok(vec![replies]);
        }

        let nodes: Vec<NodeAddress> = groups.iter().map(|(node, _, _)| node.clone()).collect();
        let mut results: Vec<Option<Vec<Value>>> = vec![None; groups.len()];
        let mut tasks = JoinSet::new();
        for (idx, (node, buf, count)) in groups.into_iter().enumerate() {
            let conn = Arc::clone(&self.conn);
            let ctx = Arc::clone(&self.ctx);
            tasks.spawn(async move {
                let replies = exchange(&*conn, &node, Bytes::from(buf), count, &ctx.config).await;
                (idx, replies)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(replies))) => results[idx] = Some(replies),
                Ok((_, Err(e))) => return Err(e),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => break,
            }
        }

        let missing = results.iter().position(Option::is_none);
        match missing {
            None => Ok(results.into_iter().flatten().collect()),
            Some(idx) => Err(Error::connection(
                &nodes[idx],
                ConnectionError::new(ConnectionErrorKind::Closed, "request task was cancelled"),
            )),
        }
    }

    /// Chase `redirect` for one command until it gets a real reply.
    ///
    /// `MOVED` refreshes the directory (at most once per call) for later
    /// commands; the command itself goes straight to the named node. `ASK`
    /// sends `ASKING` first and leaves the directory alone.
    async fn follow_redirect(
        &self,
        directory: &TopologyDirectory,
        topology: &Topology,
        cmd: &Cmd,
        mut redirect: Redirect,
        refreshed: &mut bool,
    ) -> Result<Outcome, Error> {
        for hop in 0..self.ctx.config.max_redirects {
            let target = self.ctx.router.reroute(&redirect)?;
            let node = first_node(self.ctx.router.resolve(topology, &target)?)?;
            debug!(
                command = cmd.name(),
                slot = redirect.slot,
                kind = ?redirect.kind,
                node = %node,
                hop,
                "following redirect"
            );

            let mut buf = Vec::new();
            let expected = match redirect.kind {
                RedirectKind::Moved => {
                    if !*refreshed {
                        *refreshed = true;
                        if let Err(e) = directory.refresh(&*self.conn).await {
                            warn!(error = %e, "topology refresh after MOVED failed");
                        }
                    }
                    1
                }
                RedirectKind::Ask => {
                    Request::asking().encode(&mut buf);
                    2
                }
            };
            cmd.encode(&mut buf);

            let replies =
                exchange(&*self.conn, &node, Bytes::from(buf), expected, &self.ctx.config).await?;
            let reply = replies.into_iter().last().unwrap_or(Value::Null);
            match parse_redirect(&reply) {
                Some(next) => redirect = next,
                None => return Ok(outcome(reply)),
            }
        }
        Err(Error::TooManyRedirects {
            slot: redirect.slot,
        })
    }

    async fn cluster_transaction(
        &self,
        directory: &TopologyDirectory,
        cmds: &[Cmd],
        hint: Option<&Route>,
    ) -> Result<Vec<Outcome>, Error> {
        // Checked before discovery so a rejected batch sends nothing.
        let slot = common_slot(cmds)?;

        let mut topology = self.topology(directory).await?;
        let mut node = match self.transaction_node(&topology, slot, hint) {
            Err(Error::TopologyGap { slot: gap }) => {
                debug!(slot = gap, "slot has no owner, refreshing before routing again");
                topology = self.refresh(directory).await?;
                self.transaction_node(&topology, slot, hint)?
            }
            other => other?,
        };

        let mut retried = false;
        loop {
            let replies = self.transaction(&node, cmds).await?;
            let moved = replies[1..=cmds.len()]
                .iter()
                .filter_map(parse_redirect)
                .find(|r| r.kind == RedirectKind::Moved);
            match moved {
                Some(redirect) if !retried => {
                    retried = true;
                    debug!(slot = redirect.slot, to = %redirect.address, "transaction moved, retrying");
                    if let Err(e) = directory.refresh(&*self.conn).await {
                        warn!(error = %e, "topology refresh after MOVED failed");
                    }
                    let target = self.ctx.router.reroute(&redirect)?;
                    node = first_node(self.ctx.router.resolve(&topology, &target)?)?;
                }
                _ => return spread_exec(replies, cmds.len()),
            }
        }
    }

    /// The primary that runs a transaction over `slot`.
    fn transaction_node(
        &self,
        topology: &Topology,
        slot: Option<u16>,
        hint: Option<&Route>,
    ) -> Result<NodeAddress, Error> {
        let router = &self.ctx.router;
        let target = match (slot, hint) {
            (Some(slot), _) => router.slot_target(topology, slot, false)?,
            (None, Some(Route::SlotKey(key))) => router.slot_target(topology, hash_slot(key), false)?,
            (None, Some(Route::ByAddress(node))) => RoutingTarget::ByAddress(node.clone()),
            (None, _) => RoutingTarget::RandomNode,
        };
        first_node(router.resolve(topology, &target)?)
    }
}

/// Where one command goes, resolved against a single snapshot.
struct Dispatch {
    target: RoutingTarget,
    nodes: Vec<NodeAddress>,
}

/// Send one frame and decode `expected` replies, retrying connection
/// failures with the configured backoff.
async fn exchange<C: Connection>(
    conn: &C,
    node: &NodeAddress,
    frame: Bytes,
    expected: usize,
    config: &ClientConfig,
) -> Result<Vec<Value>, Error> {
    let strategy = &config.retry_strategy;
    let mut attempt = 0;
    loop {
        let result = match send_frame(conn, node, frame.clone(), config.request_timeout).await {
            Ok(data) => decode_replies(node, &data, expected),
            Err(e) => Err(e),
        };
        match result {
            Err(e @ Error::Connection { .. }) if attempt < strategy.num_of_retries => {
                let delay = strategy.delay(attempt);
                warn!(node = %node, attempt, ?delay, error = %e, "retrying after connection error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// The single slot every key in `cmds` hashes to, or `None` if keyless.
fn common_slot(cmds: &[Cmd]) -> Result<Option<u16>, Error> {
    let mut first: Option<u16> = None;
    for key in cmds.iter().flat_map(Cmd::keys) {
        let slot = hash_slot(key);
        match first {
            None => first = Some(slot),
            Some(f) if f != slot => return Err(Error::CrossSlot { first: f, other: slot }),
            Some(_) => {}
        }
    }
    Ok(first)
}

fn first_node(nodes: Vec<NodeAddress>) -> Result<NodeAddress, Error> {
    nodes
        .into_iter()
        .next()
        .ok_or_else(|| Error::Discovery("no node to send to".into()))
}

fn outcome(value: Value) -> Outcome {
    if let Some(msg) = value.error_message() {
        return Err(ServerError::from_error_line(msg));
    }
    Ok(value)
}

/// Collect per-node replies into a map of address to reply. The first node
/// error, in node order, is the outcome instead.
fn aggregate<'a>(replies: impl Iterator<Item = (&'a NodeAddress, Value)>) -> Outcome {
    let mut entries = Vec::new();
    for (node, reply) in replies {
        let reply = outcome(reply)?;
        entries.push((Value::bulk(node.to_string()), reply));
    }
    Ok(Value::Map(entries))
}

/// Turn the replies to `MULTI`, `n` queued commands and `EXEC` into `n`
/// outcomes.
fn spread_exec(mut replies: Vec<Value>, n: usize) -> Result<Vec<Outcome>, Error> {
    let exec = replies.pop().unwrap_or(Value::Null);
    if let Some(msg) = replies.first().and_then(Value::error_message) {
        let err = ServerError::from_error_line(msg);
        return Ok((0..n).map(|_| Err(err.clone())).collect());
    }
    let queued = replies.get(1..).unwrap_or_default();

    match exec {
        Value::Array(items) if items.len() == n => Ok(items.into_iter().map(outcome).collect()),
        Value::Null => {
            let aborted = ServerError::new(
                "EXECABORT",
                "Transaction discarded because a watched key changed",
            );
            Ok((0..n).map(|_| Err(aborted.clone())).collect())
        }
        exec if exec.is_error() => {
            let aborted =
                ServerError::from_error_line(exec.error_message().unwrap_or(&b"EXECABORT"[..]));
            Ok((0..n)
                .map(|i| match queued.get(i).and_then(Value::error_message) {
                    Some(own) => Err(ServerError::from_error_line(own)),
                    None => Err(aborted.clone()),
                })
                .collect())
        }
        other => Err(Error::Protocol(ParseError::Protocol(format!(
            "unexpected EXEC reply for {n} commands: {other:?}"
        )))),
    }
}
