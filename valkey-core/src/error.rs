//! Error types.
//!
//! [`Error`] fails a whole call. [`ServerError`] is a single command's
//! rejection and only ever appears inside a batch result, at the position of
//! the command the server rejected.

use std::fmt;

use crate::topology::NodeAddress;

/// Why a connection-level operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The request or connect deadline passed.
    Timeout,
    /// The node refused the connection.
    Refused,
    /// TLS negotiation failed.
    Tls,
    /// The connection closed before all replies arrived.
    Closed,
    /// Any other I/O failure.
    Io,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionErrorKind::Timeout => "timeout",
            ConnectionErrorKind::Refused => "refused",
            ConnectionErrorKind::Tls => "tls failure",
            ConnectionErrorKind::Closed => "closed",
            ConnectionErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// A transport failure reported by a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors that fail an entire call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// An argument could not be encoded. Raised before any I/O; never retried.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An atomic batch touches more than one hash slot. Raised before any I/O.
    #[error("cross-slot atomic batch: keys hash to slots {first} and {other}")]
    CrossSlot { first: u16, other: u16 },

    /// The transport failed after the configured retries were exhausted.
    #[error("connection error on {node}: {source}")]
    Connection {
        node: NodeAddress,
        #[source]
        source: ConnectionError,
    },

    /// No seed produced a usable topology.
    #[error("topology discovery failed: {0}")]
    Discovery(String),

    /// No primary owns the slot in the current topology.
    #[error("no node owns slot {slot}")]
    TopologyGap { slot: u16 },

    /// A reply frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] resp_proto::ParseError),

    /// A command kept being redirected.
    #[error("too many redirects for slot {slot}")]
    TooManyRedirects { slot: u16 },
}

impl Error {
    pub(crate) fn connection(node: &NodeAddress, source: ConnectionError) -> Self {
        Error::Connection {
            node: node.clone(),
            source,
        }
    }

    /// Whether the failure is transient (network or topology) rather than a
    /// client-side structural problem.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. } | Error::Discovery(_) | Error::TopologyGap { .. }
        )
    }
}

/// One command's error reply.
///
/// `code` is the leading upper-case token of the error line (`ERR`,
/// `WRONGTYPE`, `EXECABORT`, ...); `message` is the remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: String,
    pub message: String,
}

impl ServerError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Split an error line into code and message.
    pub fn from_error_line(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        match text.split_once(' ') {
            Some((code, rest))
                if !code.is_empty() && code.bytes().all(|b| b.is_ascii_uppercase()) =>
            {
                Self::new(code, rest)
            }
            _ if !text.is_empty() && text.bytes().all(|b| b.is_ascii_uppercase()) => {
                Self::new(text, "")
            }
            _ => Self::new("ERR", text),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.code)
        } else {
            write!(f, "{} {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServerError {}
