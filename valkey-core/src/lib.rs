//! Command batching and cluster-aware routing for Valkey clients.
//!
//! - **Batches**: [`Batch`] collects commands through typed family traits
//!   ([`batch::prelude`]) and [`BatchExecutor::execute`] runs them as a
//!   pipeline or a `MULTI`/`EXEC` transaction, returning one [`Outcome`]
//!   per command in submission order.
//! - **Cluster routing**: [`TopologyDirectory`] discovers slot ownership
//!   with `CLUSTER SLOTS` and publishes immutable [`Topology`] snapshots;
//!   [`Router`] maps each command to its node under a [`ReadFrom`] policy.
//!   `MOVED` and `ASK` redirects are followed per command.
//! - **Transport**: bring your own [`Connection`]. The core encodes frames,
//!   decodes replies and never touches a socket.
//!
//! # Example
//!
//! ```no_run
//! use valkey_core::batch::prelude::*;
//! use valkey_core::{Batch, BatchExecutor, ClientConfig, Connection, Error};
//!
//! async fn example<C: Connection + 'static>(conn: C) -> Result<(), Error> {
//!     let config = ClientConfig::new(vec!["127.0.0.1:7000".parse()?]);
//!     let executor = BatchExecutor::cluster(conn, config);
//!
//!     let mut batch = Batch::pipeline();
//!     batch.set("k1", "v1").get("k1");
//!     let results = executor.execute(&batch, None).await?;
//!     assert_eq!(results.len(), 2);
//!     Ok(())
//! }
//! ```

pub mod batch;
mod cmd;
mod config;
mod connection;
mod error;
mod executor;
mod retry;
mod routing;
mod topology;
mod value;

pub use batch::{Atomicity, Batch};
pub use cmd::Cmd;
pub use config::{ClientConfig, Credentials, DEFAULT_MAX_REDIRECTS, ProtocolVersion, ReadFrom};
pub use connection::Connection;
pub use error::{ConnectionError, ConnectionErrorKind, Error, ServerError};
pub use executor::{BatchExecutor, ClientContext, Outcome};
pub use resp_proto::Value;
pub use retry::RetryStrategy;
pub use routing::{Route, Router, RoutingTarget};
pub use topology::{NodeAddress, Shard, Topology, TopologyDirectory};
pub use value::TypedValue;
