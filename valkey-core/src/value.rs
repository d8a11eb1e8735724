//! Binary-safe command arguments.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

use crate::error::Error;

/// A command argument: UTF-8 text or opaque bytes.
///
/// The tag records how the value was supplied; it does not take part in
/// comparison. Equality and hashing look only at the byte content, so
/// `TypedValue::from("v1") == TypedValue::from(&b"v1"[..])`.
#[derive(Clone)]
pub enum TypedValue {
    Text(String),
    Bytes(Bytes),
}

impl TypedValue {
    /// The wire representation.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TypedValue::Text(s) => s.as_bytes(),
            TypedValue::Bytes(b) => b,
        }
    }

    /// The content as text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) => Some(s),
            TypedValue::Bytes(b) => std::str::from_utf8(b).ok(),
        }
    }

    /// Convert into shared bytes without copying when already binary.
    pub fn into_bytes(self) -> Bytes {
        match self {
            TypedValue::Text(s) => Bytes::from(s),
            TypedValue::Bytes(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Encode a float argument (scores, increments).
    ///
    /// Infinite values use the server's `+inf` / `-inf` tokens. NaN has no
    /// wire form and is rejected.
    pub fn from_f64(value: f64) -> Result<Self, Error> {
        if value.is_nan() {
            return Err(Error::Encoding("NaN is not a valid numeric argument".into()));
        }
        let text = if value == f64::INFINITY {
            "+inf".to_string()
        } else if value == f64::NEG_INFINITY {
            "-inf".to_string()
        } else {
            value.to_string()
        };
        Ok(TypedValue::Text(text))
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for TypedValue {}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl AsRef<[u8]> for TypedValue {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            TypedValue::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::Text(s.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::Text(s)
    }
}

impl From<&String> for TypedValue {
    fn from(s: &String) -> Self {
        TypedValue::Text(s.clone())
    }
}

impl From<&[u8]> for TypedValue {
    fn from(b: &[u8]) -> Self {
        TypedValue::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for TypedValue {
    fn from(b: &[u8; N]) -> Self {
        TypedValue::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(b: Vec<u8>) -> Self {
        TypedValue::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for TypedValue {
    fn from(b: Bytes) -> Self {
        TypedValue::Bytes(b)
    }
}

impl From<&TypedValue> for TypedValue {
    fn from(v: &TypedValue) -> Self {
        v.clone()
    }
}

macro_rules! from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for TypedValue {
                fn from(n: $t) -> Self {
                    TypedValue::Text(itoa::Buffer::new().format(n).to_string())
                }
            }
        )*
    };
}

from_integer!(i32, i64, u32, u64, usize);
