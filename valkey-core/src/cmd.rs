//! Command descriptors.
//!
//! A [`Cmd`] is a command name plus its ordered, binary-safe arguments. It
//! is built once by a batch method and never changes afterwards. It also
//! answers the questions routing asks: which arguments are keys, and
//! whether the command only reads.

use std::fmt;

use crate::error::Error;
use crate::value::TypedValue;

/// One command: name and arguments, in wire order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Cmd {
    name: String,
    args: Vec<TypedValue>,
}

/// Where a command's keys sit among its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeySpec {
    /// No keys; routed by caller hint.
    None,
    /// The first argument.
    First,
    /// The first `n` arguments (`RENAME src dst`, `LMOVE src dst LEFT RIGHT`).
    Leading(usize),
    /// Every argument (`DEL k1 k2`, `SINTERSTORE dst k1 k2`).
    All,
    /// Every argument after the first (`BITOP AND dst k1 k2`).
    AllAfterFirst,
    /// Every argument but the trailing timeout (`BLPOP k1 k2 0`).
    AllButLast,
    /// Every other argument, starting with the first (`MSET k1 v1 k2 v2`).
    Pairs,
    /// The first `leading` arguments, then `numkeys` (at index `at`) keys
    /// right after the count (`EVAL script 2 k1 k2`,
    /// `ZUNIONSTORE dst 2 k1 k2`, `LMPOP 2 k1 k2 LEFT`).
    NumKeys { at: usize, leading: usize },
    /// The argument after a subcommand (`OBJECT ENCODING key`).
    AfterSubcommand,
    /// The first half of the arguments after `STREAMS` (`XREAD ... STREAMS k1 k2 id1 id2`).
    Streams,
}

impl Cmd {
    /// Start a command. The name is stored upper-cased.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<TypedValue>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<TypedValue>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a command from a full argument list, name first.
    ///
    /// Fails with [`Error::Encoding`] if the list is empty or the name is
    /// not text.
    pub fn from_parts(parts: Vec<TypedValue>) -> Result<Self, Error> {
        let mut parts = parts.into_iter();
        let name = parts
            .next()
            .ok_or_else(|| Error::Encoding("custom command needs at least a name".into()))?;
        let name = name
            .as_str()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Encoding("command name must be non-empty text".into()))?;
        Ok(Self {
            name: name.to_ascii_uppercase(),
            args: parts.collect(),
        })
    }

    /// Upper-cased command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments after the name.
    pub fn arguments(&self) -> &[TypedValue] {
        &self.args
    }

    /// Append the wire encoding to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(1 + self.args.len());
        parts.push(self.name.as_bytes());
        parts.extend(self.args.iter().map(TypedValue::as_bytes));
        resp_proto::encode_command(buf, &parts);
    }

    fn key_spec(&self) -> KeySpec {
        match self.name.as_str() {
            "INFO" | "PING" | "ECHO" | "DBSIZE" | "CONFIG" | "FLUSHDB" | "FLUSHALL" | "TIME"
            | "CLIENT" | "CLUSTER" | "COMMAND" | "RANDOMKEY" | "LASTSAVE" | "SAVE"
            | "BGSAVE" | "BGREWRITEAOF" | "SLOWLOG" | "MULTI" | "EXEC" | "DISCARD"
            | "SCRIPT" | "FUNCTION" | "WAIT" | "SELECT" | "ASKING" | "READONLY"
            | "READWRITE" | "LATENCY" | "MODULE" | "ACL" | "LOLWUT" | "HELLO" | "AUTH"
            | "QUIT" | "RESET" | "SWAPDB" | "UNWATCH" => KeySpec::None,
            "RENAME" | "RENAMENX" | "RPOPLPUSH" | "BRPOPLPUSH" | "LMOVE" | "BLMOVE" | "SMOVE"
            | "COPY" | "GEOSEARCHSTORE" | "ZRANGESTORE" => KeySpec::Leading(2),
            "MGET" | "DEL" | "EXISTS" | "UNLINK" | "TOUCH" | "WATCH" | "SINTER" | "SUNION"
            | "SDIFF" | "SINTERSTORE" | "SUNIONSTORE" | "SDIFFSTORE" | "PFCOUNT"
            | "PFMERGE" => KeySpec::All,
            "BITOP" => KeySpec::AllAfterFirst,
            "BLPOP" | "BRPOP" | "BZPOPMIN" | "BZPOPMAX" => KeySpec::AllButLast,
            "MSET" | "MSETNX" => KeySpec::Pairs,
            "EVAL" | "EVALSHA" | "EVAL_RO" | "EVALSHA_RO" | "FCALL" | "FCALL_RO"
            | "BLMPOP" | "BZMPOP" => KeySpec::NumKeys { at: 1, leading: 0 },
            "ZUNIONSTORE" | "ZINTERSTORE" | "ZDIFFSTORE" => KeySpec::NumKeys { at: 1, leading: 1 },
            "ZUNION" | "ZINTER" | "ZDIFF" | "ZINTERCARD" | "SINTERCARD" | "LMPOP" | "ZMPOP" => {
                KeySpec::NumKeys { at: 0, leading: 0 }
            }
            "OBJECT" | "XINFO" | "XGROUP" => KeySpec::AfterSubcommand,
            "MEMORY" => match self.args.first().and_then(TypedValue::as_str) {
                Some(sub) if sub.eq_ignore_ascii_case("USAGE") => KeySpec::AfterSubcommand,
                _ => KeySpec::None,
            },
            "XREAD" | "XREADGROUP" => KeySpec::Streams,
            _ => KeySpec::First,
        }
    }

    /// The key arguments, in order.
    pub fn keys(&self) -> Vec<&[u8]> {
        let args = &self.args;
        let keys: Vec<&TypedValue> = match self.key_spec() {
            KeySpec::None => Vec::new(),
            KeySpec::First => args.iter().take(1).collect(),
            KeySpec::Leading(n) => args.iter().take(n).collect(),
            KeySpec::All => args.iter().collect(),
            KeySpec::AllAfterFirst => args.iter().skip(1).collect(),
            KeySpec::AllButLast => args.iter().take(args.len().saturating_sub(1)).collect(),
            KeySpec::Pairs => args.iter().step_by(2).collect(),
            KeySpec::NumKeys { at, leading } => {
                let count = args
                    .get(at)
                    .and_then(TypedValue::as_str)
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(0);
                args.iter()
                    .take(leading.min(at))
                    .chain(args.iter().skip(at + 1).take(count))
                    .collect()
            }
            KeySpec::AfterSubcommand => args.iter().skip(1).take(1).collect(),
            KeySpec::Streams => {
                let start = args.iter().position(|a| {
                    a.as_str().is_some_and(|s| s.eq_ignore_ascii_case("STREAMS"))
                });
                match start {
                    Some(i) => {
                        let rest = &args[i + 1..];
                        rest.iter().take(rest.len() / 2).collect()
                    }
                    None => Vec::new(),
                }
            }
        };
        keys.into_iter().map(TypedValue::as_bytes).collect()
    }

    /// The key that decides this command's slot.
    pub fn first_key(&self) -> Option<&[u8]> {
        self.keys().into_iter().next()
    }

    /// Whether the command never writes, making it eligible for replicas.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self.name.as_str(),
            "GET"
                | "MGET"
                | "STRLEN"
                | "GETRANGE"
                | "EXISTS"
                | "TYPE"
                | "TTL"
                | "PTTL"
                | "HGET"
                | "HMGET"
                | "HGETALL"
                | "HKEYS"
                | "HVALS"
                | "HLEN"
                | "HEXISTS"
                | "LRANGE"
                | "LLEN"
                | "LINDEX"
                | "LPOS"
                | "SMEMBERS"
                | "SCARD"
                | "SISMEMBER"
                | "SMISMEMBER"
                | "SRANDMEMBER"
                | "SINTER"
                | "SUNION"
                | "SDIFF"
                | "ZRANGE"
                | "ZRANGEBYSCORE"
                | "ZREVRANGE"
                | "ZCARD"
                | "ZSCORE"
                | "ZMSCORE"
                | "ZCOUNT"
                | "ZRANK"
                | "ZREVRANK"
                | "BITCOUNT"
                | "GETBIT"
                | "PFCOUNT"
                | "EVAL_RO"
                | "EVALSHA_RO"
                | "FCALL_RO"
        )
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
