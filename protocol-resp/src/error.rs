//! Error types for RESP frame decoding.

/// Error returned while decoding a RESP reply frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The buffer ends before the frame does.
    /// Not fatal: buffer more bytes and decode again from the same offset.
    #[error("incomplete data")]
    Incomplete,

    /// The first byte of a frame is not a known RESP type marker.
    #[error("invalid prefix byte: {0:#04x}")]
    InvalidPrefix(u8),

    /// An integer or length field is not a valid decimal number.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// A length field is negative where only `-1` (null) is allowed.
    #[error("invalid length")]
    InvalidLength,

    /// Structurally invalid frame (e.g. missing CRLF after a bulk payload).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An aggregate announces more elements than the decoder accepts.
    #[error("collection too large: {0} elements exceeds limit")]
    CollectionTooLarge(usize),

    /// Aggregates are nested deeper than the decoder accepts.
    #[error("nesting too deep: depth {0} exceeds limit")]
    NestingTooDeep(usize),

    /// A bulk payload is larger than the decoder accepts.
    #[error("bulk string too long: {len} bytes exceeds {max} byte limit")]
    BulkStringTooLong { len: usize, max: usize },

    /// A RESP3 double is not a valid float.
    #[error("invalid double: {0}")]
    InvalidDouble(String),

    /// A RESP3 boolean is neither `t` nor `f`.
    #[error("invalid boolean: expected 't' or 'f'")]
    InvalidBoolean,

    /// A RESP3 verbatim string lacks its `xxx:` format prefix.
    #[error("invalid verbatim string format")]
    InvalidVerbatimFormat,
}

impl ParseError {
    /// Returns true if more bytes may complete the frame.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}
