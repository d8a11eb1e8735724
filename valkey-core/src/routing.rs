//! Per-command routing decisions.
//!
//! [`Router::route`] turns a command into a [`RoutingTarget`] against one
//! topology snapshot; [`Router::resolve`] turns that target into concrete
//! nodes. Both are pure over the snapshot they are given, so a decision
//! never mixes two topologies.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use rand::seq::SliceRandom;
use resp_proto::{Redirect, hash_slot};
use tracing::trace;

use crate::cmd::Cmd;
use crate::config::ReadFrom;
use crate::error::Error;
use crate::topology::{NodeAddress, Shard, Topology};

/// Caller's choice of destination for commands without a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// One primary picked at random. The default.
    Random,
    /// Every primary; replies are collected per node.
    AllPrimaries,
    /// Every primary and replica; replies are collected per node.
    AllNodes,
    /// Whichever node owns this key's slot.
    SlotKey(Bytes),
    /// A specific node.
    ByAddress(NodeAddress),
}

/// Where one command goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingTarget {
    /// The node picked for a slot.
    SingleNode(NodeAddress),
    /// Any one primary, picked when the target is resolved.
    RandomNode,
    AllPrimaries,
    AllNodes,
    /// A node named by the caller or a redirect.
    ByAddress(NodeAddress),
}

impl RoutingTarget {
    /// Whether the command fans out and its replies are aggregated.
    #[inline]
    pub fn is_multi_node(&self) -> bool {
        matches!(self, RoutingTarget::AllPrimaries | RoutingTarget::AllNodes)
    }
}

/// Applies slot ownership and the read-from policy.
#[derive(Debug)]
pub struct Router {
    read_from: ReadFrom,
    replica_cursor: AtomicUsize,
}

impl Router {
    pub fn new(read_from: ReadFrom) -> Self {
        Self {
            read_from,
            replica_cursor: AtomicUsize::new(0),
        }
    }

    pub fn read_from(&self) -> ReadFrom {
        self.read_from
    }

    /// Route `cmd` against `topology`.
    ///
    /// Commands with a key go to the owner of the first key's slot, or one
    /// of its replicas when the command only reads and the policy allows.
    /// Keyless commands follow `hint`, defaulting to a random primary.
    pub fn route(
        &self,
        topology: &Topology,
        cmd: &Cmd,
        hint: Option<&Route>,
    ) -> Result<RoutingTarget, Error> {
        let target = match (cmd.first_key(), hint) {
            (Some(key), _) => self.slot_target(topology, hash_slot(key), cmd.is_read_only())?,
            (None, None | Some(Route::Random)) => RoutingTarget::RandomNode,
            (None, Some(Route::AllPrimaries)) => RoutingTarget::AllPrimaries,
            (None, Some(Route::AllNodes)) => RoutingTarget::AllNodes,
            (None, Some(Route::SlotKey(key))) => {
                self.slot_target(topology, hash_slot(key), cmd.is_read_only())?
            }
            (None, Some(Route::ByAddress(node))) => RoutingTarget::ByAddress(node.clone()),
        };
        trace!(command = cmd.name(), ?target, "routed");
        Ok(target)
    }

    /// The node serving `slot`, or [`Error::TopologyGap`].
    pub fn slot_target(
        &self,
        topology: &Topology,
        slot: u16,
        read_only: bool,
    ) -> Result<RoutingTarget, Error> {
        let shard = topology.lookup(slot)?;
        Ok(RoutingTarget::SingleNode(self.select(shard, read_only).clone()))
    }

    /// Pick the node within `shard` according to the read-from policy.
    pub fn select<'a>(&self, shard: &'a Shard, read_only: bool) -> &'a NodeAddress {
        if !read_only || shard.replicas.is_empty() {
            return &shard.primary;
        }
        match self.read_from {
            ReadFrom::Primary => &shard.primary,
            ReadFrom::PreferReplica => {
                let n = self.replica_cursor.fetch_add(1, Ordering::Relaxed);
                &shard.replicas[n % shard.replicas.len()]
            }
            ReadFrom::RandomReplica => shard
                .replicas
                .choose(&mut rand::thread_rng())
                .unwrap_or(&shard.primary),
        }
    }

    /// The concrete nodes for `target`.
    pub fn resolve(
        &self,
        topology: &Topology,
        target: &RoutingTarget,
    ) -> Result<Vec<NodeAddress>, Error> {
        let nodes = match target {
            RoutingTarget::SingleNode(node) | RoutingTarget::ByAddress(node) => vec![node.clone()],
            RoutingTarget::RandomNode => {
                let primaries = topology.primaries();
                let node = primaries
                    .choose(&mut rand::thread_rng())
                    .ok_or_else(|| Error::Discovery("topology has no primaries".into()))?;
                vec![(*node).clone()]
            }
            RoutingTarget::AllPrimaries => topology.primaries().into_iter().cloned().collect(),
            RoutingTarget::AllNodes => topology.nodes().into_iter().cloned().collect(),
        };
        if nodes.is_empty() {
            return Err(Error::Discovery("topology has no nodes".into()));
        }
        Ok(nodes)
    }

    /// The new target for one command the server redirected.
    pub fn reroute(&self, redirect: &Redirect) -> Result<RoutingTarget, Error> {
        let node = redirect.address.parse::<NodeAddress>().map_err(|_| {
            Error::Protocol(resp_proto::ParseError::Protocol(format!(
                "redirect to unparseable address `{}`",
                redirect.address
            )))
        })?;
        Ok(RoutingTarget::ByAddress(node))
    }
}
