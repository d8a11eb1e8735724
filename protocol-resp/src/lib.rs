//! RESP2/RESP3 wire codec for Valkey clients.
//!
//! - **Replies**: decode any RESP2 or RESP3 frame into a [`Value`]
//!   ([`Value::parse`]) and encode values back ([`Value::encode`]), which
//!   test servers use to answer requests.
//! - **Requests**: encode commands as arrays of bulk strings
//!   ([`encode_command`], [`Request`]). Encoding is lossless for arbitrary
//!   bytes.
//! - **Cluster**: CRC16 hash slots ([`hash_slot`]) and `MOVED`/`ASK`
//!   redirect decoding ([`parse_redirect`]).
//!
//! # Example
//!
//! ```
//! use protocol_resp::{Value, encode_command};
//!
//! let mut buf = Vec::new();
//! encode_command(&mut buf, &[&b"GET"[..], b"mykey"]);
//!
//! let (reply, consumed) = Value::parse(b"$5\r\nhello\r\n").unwrap();
//! assert_eq!(reply.as_bytes(), Some(&b"hello"[..]));
//! assert_eq!(consumed, 11);
//! ```

pub mod cluster;
mod error;
mod request;
mod value;

pub use cluster::{
    Redirect, RedirectKind, SLOT_COUNT, crc16, hash_slot, hash_tag, parse_redirect,
};
pub use error::ParseError;
pub use request::{Request, encode_command, encoded_len};
pub use value::{
    DEFAULT_MAX_BULK_STRING_LEN, DEFAULT_MAX_COLLECTION_ELEMENTS, DEFAULT_MAX_DEPTH,
    ParseOptions, Value,
};
