//! The transport seam.
//!
//! The core never opens sockets. It hands a [`Connection`] one encoded
//! frame per destination node (one or more pipelined commands) and gets
//! back the raw bytes of all replies to that frame.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use resp_proto::{ParseError, Value};

use crate::error::{ConnectionError, ConnectionErrorKind, Error};
use crate::topology::NodeAddress;

/// Sends encoded request frames to nodes.
///
/// Implementations own connection establishment, TLS, authentication and
/// database selection. `send` must write `frame` to `node` and return every
/// byte of the replies; the core knows how many replies to expect and
/// treats a short read as a closed connection.
///
/// # Example
///
/// ```no_run
/// use std::future::Future;
/// use bytes::Bytes;
/// use valkey_core::{Connection, ConnectionError, NodeAddress};
///
/// struct Unreachable;
///
/// impl Connection for Unreachable {
///     fn send(
///         &self,
///         node: &NodeAddress,
///         _frame: Bytes,
///     ) -> impl Future<Output = Result<Bytes, ConnectionError>> + Send {
///         let node = node.to_string();
///         async move {
///             Err(ConnectionError::new(
///                 valkey_core::ConnectionErrorKind::Refused,
///                 format!("{node} is down"),
///             ))
///         }
///     }
/// }
/// ```
pub trait Connection: Send + Sync {
    fn send(
        &self,
        node: &NodeAddress,
        frame: Bytes,
    ) -> impl Future<Output = Result<Bytes, ConnectionError>> + Send;
}

impl<C: Connection> Connection for Arc<C> {
    fn send(
        &self,
        node: &NodeAddress,
        frame: Bytes,
    ) -> impl Future<Output = Result<Bytes, ConnectionError>> + Send {
        (**self).send(node, frame)
    }
}

/// One `send`, bounded by `timeout` when set.
pub(crate) async fn send_frame<C: Connection>(
    conn: &C,
    node: &NodeAddress,
    frame: Bytes,
    timeout: Option<Duration>,
) -> Result<Bytes, Error> {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, conn.send(node, frame)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::new(
                ConnectionErrorKind::Timeout,
                format!("no reply within {}ms", limit.as_millis()),
            )),
        },
        None => conn.send(node, frame).await,
    };
    result.map_err(|e| Error::connection(node, e))
}

/// Split `data` into exactly `count` reply frames.
///
/// Running out of bytes early means the connection dropped mid-reply.
pub(crate) fn decode_replies(
    node: &NodeAddress,
    data: &[u8],
    count: usize,
) -> Result<Vec<Value>, Error> {
    let mut replies = Vec::with_capacity(count);
    let mut offset = 0;
    while replies.len() < count {
        match Value::parse(&data[offset..]) {
            Ok((value, used)) => {
                replies.push(value);
                offset += used;
            }
            Err(ParseError::Incomplete) => {
                return Err(Error::connection(
                    node,
                    ConnectionError::new(
                        ConnectionErrorKind::Closed,
                        format!("connection closed after {} of {count} replies", replies.len()),
                    ),
                ));
            }
            Err(e) => return Err(Error::Protocol(e)),
        }
    }
    if offset < data.len() {
        tracing::warn!(
            node = %node,
            extra = data.len() - offset,
            "ignoring bytes after the expected replies"
        );
    }
    Ok(replies)
}
