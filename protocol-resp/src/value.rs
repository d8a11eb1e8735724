//! RESP reply values: decoding and encoding.
//!
//! RESP2 types:
//! - Simple String: `+OK\r\n`
//! - Error: `-ERR message\r\n`
//! - Integer: `:1000\r\n`
//! - Bulk String: `$6\r\nfoobar\r\n` (null: `$-1\r\n`)
//! - Array: `*2\r\n...` (null: `*-1\r\n`)
//!
//! RESP3 types:
//! - Null `_`, Boolean `#`, Double `,`, Big Number `(`, Bulk Error `!`,
//!   Verbatim String `=`, Map `%`, Set `~`, Push `>`
//! - Attribute `|` frames are decoded and dropped; the value they annotate
//!   is returned in their place.
//!
//! Decoding is incremental: [`Value::parse`] returns
//! [`ParseError::Incomplete`] until the buffer holds a whole frame, and
//! reports how many bytes the frame occupied once it does.

use bytes::Bytes;

use crate::error::ParseError;

/// Default maximum nesting depth of aggregate replies.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Default maximum number of elements announced by one aggregate.
pub const DEFAULT_MAX_COLLECTION_ELEMENTS: usize = 1 << 24;

/// Default maximum bulk payload size (512 MiB, the server's own limit).
pub const DEFAULT_MAX_BULK_STRING_LEN: usize = 512 * 1024 * 1024;

/// Limits applied while decoding a reply frame.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Maximum nesting depth of aggregates.
    pub max_depth: usize,
    /// Maximum element count of a single aggregate.
    pub max_collection_elements: usize,
    /// Maximum bulk payload length in bytes.
    pub max_bulk_string_len: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseOptions {
    /// Options with the default limits.
    pub const fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_collection_elements: DEFAULT_MAX_COLLECTION_ELEMENTS,
            max_bulk_string_len: DEFAULT_MAX_BULK_STRING_LEN,
        }
    }

    /// Set the maximum nesting depth.
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the maximum aggregate element count.
    pub const fn max_collection_elements(mut self, count: usize) -> Self {
        self.max_collection_elements = count;
        self
    }

    /// Set the maximum bulk payload length.
    pub const fn max_bulk_string_len(mut self, len: usize) -> Self {
        self.max_bulk_string_len = len;
        self
    }
}

/// A decoded RESP2/RESP3 reply.
///
/// Replies of different commands have different shapes; callers match on
/// the variant instead of inspecting types at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `+` status reply, e.g. `OK` or `QUEUED`.
    SimpleString(Bytes),
    /// `-` error reply; the full error line without the prefix.
    Error(Bytes),
    /// `:` integer reply.
    Integer(i64),
    /// `$` binary-safe payload.
    BulkString(Bytes),
    /// RESP2 null bulk / null array, or RESP3 `_`.
    Null,
    /// `*` array.
    Array(Vec<Value>),
    /// `#` boolean.
    Boolean(bool),
    /// `,` double.
    Double(f64),
    /// `(` arbitrary precision integer, kept as its decimal text.
    BigNumber(Bytes),
    /// `!` binary-safe error.
    BulkError(Bytes),
    /// `=` text with a three byte format tag (`txt`, `mkd`).
    VerbatimString { format: [u8; 3], data: Bytes },
    /// `%` map, in wire order.
    Map(Vec<(Value, Value)>),
    /// `~` set, in wire order.
    Set(Vec<Value>),
    /// `>` out-of-band push.
    Push(Vec<Value>),
}

impl Value {
    /// The `+OK` status reply.
    pub fn ok() -> Self {
        Value::SimpleString(Bytes::from_static(b"OK"))
    }

    /// A status reply.
    pub fn simple(s: impl Into<Bytes>) -> Self {
        Value::SimpleString(s.into())
    }

    /// An error reply.
    pub fn error(msg: impl Into<Bytes>) -> Self {
        Value::Error(msg.into())
    }

    /// A bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Value::BulkString(data.into())
    }

    /// Returns true for `Null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for `Error` and `BulkError`.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_) | Value::BulkError(_))
    }

    /// Returns true for the `+OK` status reply.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Value::SimpleString(s) if s.as_ref() == b"OK")
    }

    /// Error text of an `Error` or `BulkError` reply.
    pub fn error_message(&self) -> Option<&[u8]> {
        match self {
            Value::Error(msg) | Value::BulkError(msg) => Some(msg),
            _ => None,
        }
    }

    /// Payload of a string-like reply.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(s) | Value::BulkString(s) | Value::BigNumber(s) => Some(s),
            Value::VerbatimString { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Integer reply, also accepting a bulk string holding a decimal number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::BulkString(s) => std::str::from_utf8(s).ok()?.parse().ok(),
            _ => None,
        }
    }

    /// Elements of an array, set or push reply.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Set(items) | Value::Push(items) => Some(items),
            _ => None,
        }
    }

    /// Decode one frame from the front of `data` with default limits.
    ///
    /// Returns the value and the number of bytes it occupied.
    pub fn parse(data: &[u8]) -> Result<(Value, usize), ParseError> {
        Self::parse_with_options(data, &ParseOptions::default())
    }

    /// Decode one frame from the front of `data`.
    pub fn parse_with_options(
        data: &[u8],
        options: &ParseOptions,
    ) -> Result<(Value, usize), ParseError> {
        parse_value(data, options, 0)
    }

    /// Append the wire encoding of this value to `buf`.
    ///
    /// `Null` is written in its RESP2 form (`$-1`), which both protocol
    /// versions accept.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Value::SimpleString(s) => put_line(buf, b'+', s),
            Value::Error(msg) => put_line(buf, b'-', msg),
            Value::Integer(n) => put_int(buf, b':', *n),
            Value::BulkString(data) => put_blob(buf, b'$', data),
            Value::Null => buf.extend_from_slice(b"$-1\r\n"),
            Value::Array(items) => put_aggregate(buf, b'*', items),
            Value::Boolean(b) => buf.extend_from_slice(if *b { b"#t\r\n" } else { b"#f\r\n" }),
            Value::Double(d) => {
                let text = if d.is_nan() {
                    "nan".to_string()
                } else if d.is_infinite() {
                    if *d > 0.0 { "inf".to_string() } else { "-inf".to_string() }
                } else {
                    d.to_string()
                };
                put_line(buf, b',', text.as_bytes());
            }
            Value::BigNumber(n) => put_line(buf, b'(', n),
            Value::BulkError(msg) => put_blob(buf, b'!', msg),
            Value::VerbatimString { format, data } => {
                put_len(buf, b'=', format.len() + 1 + data.len());
                buf.extend_from_slice(format);
                buf.push(b':');
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            Value::Map(entries) => {
                put_len(buf, b'%', entries.len());
                for (k, v) in entries {
                    k.encode(buf);
                    v.encode(buf);
                }
            }
            Value::Set(items) => put_aggregate(buf, b'~', items),
            Value::Push(items) => put_aggregate(buf, b'>', items),
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        Bytes::from(buf)
    }
}

// ── Decoding ────────────────────────────────────────────────────────────

fn parse_value(
    data: &[u8],
    options: &ParseOptions,
    depth: usize,
) -> Result<(Value, usize), ParseError> {
    let prefix = *data.first().ok_or(ParseError::Incomplete)?;
    match prefix {
        b'+' => {
            let (line, used) = read_line(data)?;
            Ok((Value::SimpleString(Bytes::copy_from_slice(line)), used))
        }
        b'-' => {
            let (line, used) = read_line(data)?;
            Ok((Value::Error(Bytes::copy_from_slice(line)), used))
        }
        b':' => {
            let (line, used) = read_line(data)?;
            Ok((Value::Integer(parse_int(line)?), used))
        }
        b'$' => match read_blob(data, options)? {
            (Some(payload), used) => Ok((Value::BulkString(Bytes::copy_from_slice(payload)), used)),
            (None, used) => Ok((Value::Null, used)),
        },
        b'!' => match read_blob(data, options)? {
            (Some(payload), used) => Ok((Value::BulkError(Bytes::copy_from_slice(payload)), used)),
            (None, _) => Err(ParseError::InvalidLength),
        },
        b'=' => match read_blob(data, options)? {
            (Some(payload), used) => {
                if payload.len() < 4 || payload[3] != b':' {
                    return Err(ParseError::InvalidVerbatimFormat);
                }
                let format = [payload[0], payload[1], payload[2]];
                let data = Bytes::copy_from_slice(&payload[4..]);
                Ok((Value::VerbatimString { format, data }, used))
            }
            (None, _) => Err(ParseError::InvalidLength),
        },
        b'_' => {
            let (line, used) = read_line(data)?;
            if !line.is_empty() {
                return Err(ParseError::Protocol("null frame carries data".into()));
            }
            Ok((Value::Null, used))
        }
        b'#' => {
            let (line, used) = read_line(data)?;
            match line {
                b"t" => Ok((Value::Boolean(true), used)),
                b"f" => Ok((Value::Boolean(false), used)),
                _ => Err(ParseError::InvalidBoolean),
            }
        }
        b',' => {
            let (line, used) = read_line(data)?;
            let text = std::str::from_utf8(line)
                .map_err(|_| ParseError::InvalidDouble(String::from_utf8_lossy(line).into()))?;
            let d = text
                .parse::<f64>()
                .map_err(|_| ParseError::InvalidDouble(text.to_string()))?;
            Ok((Value::Double(d), used))
        }
        b'(' => {
            let (line, used) = read_line(data)?;
            Ok((Value::BigNumber(Bytes::copy_from_slice(line)), used))
        }
        b'*' | b'~' | b'>' => {
            let (count, header) = read_count(data, options)?;
            let Some(count) = count else {
                return Ok((Value::Null, header));
            };
            let (items, used) = parse_elements(data, header, count, options, depth)?;
            let value = match prefix {
                b'*' => Value::Array(items),
                b'~' => Value::Set(items),
                _ => Value::Push(items),
            };
            Ok((value, used))
        }
        b'%' | b'|' => {
            let (count, header) = read_count(data, options)?;
            let Some(count) = count else {
                return Ok((Value::Null, header));
            };
            let pairs = count
                .checked_mul(2)
                .ok_or(ParseError::CollectionTooLarge(count))?;
            let (items, used) = parse_elements(data, header, pairs, options, depth)?;
            if prefix == b'|' {
                // Attributes annotate the next frame; hand that frame back instead.
                let (value, next) = parse_value(&data[used..], options, depth)?;
                return Ok((value, used + next));
            }
            let mut entries = Vec::with_capacity(count);
            let mut iter = items.into_iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                entries.push((k, v));
            }
            Ok((Value::Map(entries), used))
        }
        other => Err(ParseError::InvalidPrefix(other)),
    }
}

/// Line content after the type byte, and the offset just past its CRLF.
fn read_line(data: &[u8]) -> Result<(&[u8], usize), ParseError> {
    let body = &data[1..];
    let cr = memchr::memchr(b'\r', body).ok_or(ParseError::Incomplete)?;
    match body.get(cr + 1) {
        None => Err(ParseError::Incomplete),
        Some(b'\n') => Ok((&body[..cr], cr + 3)),
        Some(_) => Err(ParseError::Protocol("expected CRLF".into())),
    }
}

fn parse_int(line: &[u8]) -> Result<i64, ParseError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ParseError::InvalidInteger(String::from_utf8_lossy(line).into()))?;
    text.parse()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))
}

/// Length-prefixed payload. `None` for a `-1` length.
fn read_blob<'a>(
    data: &'a [u8],
    options: &ParseOptions,
) -> Result<(Option<&'a [u8]>, usize), ParseError> {
    let (line, header) = read_line(data)?;
    let len = parse_int(line)?;
    if len == -1 {
        return Ok((None, header));
    }
    let len = usize::try_from(len).map_err(|_| ParseError::InvalidLength)?;
    if len > options.max_bulk_string_len {
        return Err(ParseError::BulkStringTooLong {
            len,
            max: options.max_bulk_string_len,
        });
    }
    let end = header + len;
    if data.len() < end + 2 {
        return Err(ParseError::Incomplete);
    }
    if &data[end..end + 2] != b"\r\n" {
        return Err(ParseError::Protocol("bulk payload not terminated by CRLF".into()));
    }
    Ok((Some(&data[header..end]), end + 2))
}

/// Aggregate element count. `None` for a `-1` count.
fn read_count(data: &[u8], options: &ParseOptions) -> Result<(Option<usize>, usize), ParseError> {
    let (line, header) = read_line(data)?;
    let count = parse_int(line)?;
    if count == -1 {
        return Ok((None, header));
    }
    let count = usize::try_from(count).map_err(|_| ParseError::InvalidLength)?;
    if count > options.max_collection_elements {
        return Err(ParseError::CollectionTooLarge(count));
    }
    Ok((Some(count), header))
}

fn parse_elements(
    data: &[u8],
    mut offset: usize,
    count: usize,
    options: &ParseOptions,
    depth: usize,
) -> Result<(Vec<Value>, usize), ParseError> {
    if depth + 1 > options.max_depth {
        return Err(ParseError::NestingTooDeep(depth + 1));
    }
    // Cap the up-front allocation; the announced count is untrusted.
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let (item, used) = parse_value(&data[offset..], options, depth + 1)?;
        items.push(item);
        offset += used;
    }
    Ok((items, offset))
}

// ── Encoding ────────────────────────────────────────────────────────────

fn put_line(buf: &mut Vec<u8>, prefix: u8, line: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(line);
    buf.extend_from_slice(b"\r\n");
}

fn put_int(buf: &mut Vec<u8>, prefix: u8, n: i64) {
    let mut text = itoa::Buffer::new();
    put_line(buf, prefix, text.format(n).as_bytes());
}

fn put_len(buf: &mut Vec<u8>, prefix: u8, len: usize) {
    let mut text = itoa::Buffer::new();
    put_line(buf, prefix, text.format(len).as_bytes());
}

fn put_blob(buf: &mut Vec<u8>, prefix: u8, payload: &[u8]) {
    put_len(buf, prefix, payload.len());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(b"\r\n");
}

fn put_aggregate(buf: &mut Vec<u8>, prefix: u8, items: &[Value]) {
    put_len(buf, prefix, items.len());
    for item in items {
        item.encode(buf);
    }
}
