//! Command families.
//!
//! Each family is a trait with provided methods over [`CommandSink`], so
//! any sink (in practice [`Batch`](super::Batch)) gets every family for
//! free. Methods append exactly one command. The few that can reject an
//! argument return `Result` and append nothing on error.

use std::fmt;

use crate::cmd::Cmd;
use crate::error::Error;
use crate::value::TypedValue;

/// Something commands can be appended to.
pub trait CommandSink {
    fn add_command(&mut self, cmd: Cmd) -> &mut Self;
}

// ── Strings ─────────────────────────────────────────────────────────────

/// Condition for `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCondition {
    /// `XX`
    OnlyIfExists,
    /// `NX`
    OnlyIfDoesNotExist,
}

/// Expiry for `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// `EX`
    Seconds(u64),
    /// `PX`
    Milliseconds(u64),
    /// `KEEPTTL`
    KeepTtl,
}

/// Options for [`StringCommands::set_with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: Option<SetCondition>,
    /// Return the old value (`GET`).
    pub return_old: bool,
    pub expiry: Option<Expiry>,
}

pub trait StringCommands: CommandSink {
    /// `SET key value`
    fn set(&mut self, key: impl Into<TypedValue>, value: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("SET").arg(key).arg(value))
    }

    /// `SET key value [NX|XX] [GET] [EX s|PX ms|KEEPTTL]`
    fn set_with_options(
        &mut self,
        key: impl Into<TypedValue>,
        value: impl Into<TypedValue>,
        options: SetOptions,
    ) -> &mut Self {
        let mut cmd = Cmd::new("SET").arg(key).arg(value);
        cmd = match options.condition {
            Some(SetCondition::OnlyIfExists) => cmd.arg("XX"),
            Some(SetCondition::OnlyIfDoesNotExist) => cmd.arg("NX"),
            None => cmd,
        };
        if options.return_old {
            cmd = cmd.arg("GET");
        }
        cmd = match options.expiry {
            Some(Expiry::Seconds(s)) => cmd.arg("EX").arg(s),
            Some(Expiry::Milliseconds(ms)) => cmd.arg("PX").arg(ms),
            Some(Expiry::KeepTtl) => cmd.arg("KEEPTTL"),
            None => cmd,
        };
        self.add_command(cmd)
    }

    fn get(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("GET").arg(key))
    }

    /// Get the value and delete the key.
    fn getdel(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("GETDEL").arg(key))
    }

    fn mget(&mut self, keys: impl IntoIterator<Item = impl Into<TypedValue>>) -> &mut Self {
        self.add_command(Cmd::new("MGET").args(keys))
    }

    fn mset<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<TypedValue>,
        V: Into<TypedValue>,
    {
        let mut cmd = Cmd::new("MSET");
        for (key, value) in pairs {
            cmd = cmd.arg(key).arg(value);
        }
        self.add_command(cmd)
    }

    fn incr(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("INCR").arg(key))
    }

    fn incrby(&mut self, key: impl Into<TypedValue>, delta: i64) -> &mut Self {
        self.add_command(Cmd::new("INCRBY").arg(key).arg(delta))
    }

    fn decr(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("DECR").arg(key))
    }

    fn append(&mut self, key: impl Into<TypedValue>, value: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("APPEND").arg(key).arg(value))
    }

    fn strlen(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("STRLEN").arg(key))
    }
}

// ── Lists ───────────────────────────────────────────────────────────────

pub trait ListCommands: CommandSink {
    /// Push to the head; the reply is the new length.
    fn lpush(
        &mut self,
        key: impl Into<TypedValue>,
        elements: impl IntoIterator<Item = impl Into<TypedValue>>,
    ) -> &mut Self {
        self.add_command(Cmd::new("LPUSH").arg(key).args(elements))
    }

    /// Push to the tail; the reply is the new length.
    fn rpush(
        &mut self,
        key: impl Into<TypedValue>,
        elements: impl IntoIterator<Item = impl Into<TypedValue>>,
    ) -> &mut Self {
        self.add_command(Cmd::new("RPUSH").arg(key).args(elements))
    }

    fn lpop(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("LPOP").arg(key))
    }

    fn rpop(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("RPOP").arg(key))
    }

    /// Elements `start..=stop`; negative indices count from the tail.
    fn lrange(&mut self, key: impl Into<TypedValue>, start: i64, stop: i64) -> &mut Self {
        self.add_command(Cmd::new("LRANGE").arg(key).arg(start).arg(stop))
    }

    fn llen(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("LLEN").arg(key))
    }

    fn lindex(&mut self, key: impl Into<TypedValue>, index: i64) -> &mut Self {
        self.add_command(Cmd::new("LINDEX").arg(key).arg(index))
    }
}

// ── Sets ────────────────────────────────────────────────────────────────

pub trait SetCommands: CommandSink {
    fn sadd(
        &mut self,
        key: impl Into<TypedValue>,
        members: impl IntoIterator<Item = impl Into<TypedValue>>,
    ) -> &mut Self {
        self.add_command(Cmd::new("SADD").arg(key).args(members))
    }

    fn srem(
        &mut self,
        key: impl Into<TypedValue>,
        members: impl IntoIterator<Item = impl Into<TypedValue>>,
    ) -> &mut Self {
        self.add_command(Cmd::new("SREM").arg(key).args(members))
    }

    fn smembers(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("SMEMBERS").arg(key))
    }

    fn scard(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("SCARD").arg(key))
    }

    fn sismember(
        &mut self,
        key: impl Into<TypedValue>,
        member: impl Into<TypedValue>,
    ) -> &mut Self {
        self.add_command(Cmd::new("SISMEMBER").arg(key).arg(member))
    }
}

// ── Sorted sets ─────────────────────────────────────────────────────────

pub trait SortedSetCommands: CommandSink {
    /// `ZADD key score member [score member ...]`
    ///
    /// Fails with [`Error::Encoding`] if any score is NaN.
    fn zadd<M: Into<TypedValue>>(
        &mut self,
        key: impl Into<TypedValue>,
        members: impl IntoIterator<Item = (f64, M)>,
    ) -> Result<&mut Self, Error> {
        let mut cmd = Cmd::new("ZADD").arg(key);
        for (score, member) in members {
            cmd = cmd.arg(TypedValue::from_f64(score)?).arg(member);
        }
        Ok(self.add_command(cmd))
    }

    fn zrem(
        &mut self,
        key: impl Into<TypedValue>,
        members: impl IntoIterator<Item = impl Into<TypedValue>>,
    ) -> &mut Self {
        self.add_command(Cmd::new("ZREM").arg(key).args(members))
    }

    /// Members by rank, `start..=stop`.
    fn zrange(&mut self, key: impl Into<TypedValue>, start: i64, stop: i64) -> &mut Self {
        self.add_command(Cmd::new("ZRANGE").arg(key).arg(start).arg(stop))
    }

    /// Like [`zrange`](Self::zrange), with scores interleaved.
    fn zrange_withscores(
        &mut self,
        key: impl Into<TypedValue>,
        start: i64,
        stop: i64,
    ) -> &mut Self {
        self.add_command(
            Cmd::new("ZRANGE")
                .arg(key)
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES"),
        )
    }

    fn zscore(&mut self, key: impl Into<TypedValue>, member: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("ZSCORE").arg(key).arg(member))
    }

    fn zcard(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("ZCARD").arg(key))
    }

    /// Fails with [`Error::Encoding`] if `increment` is NaN.
    fn zincrby(
        &mut self,
        key: impl Into<TypedValue>,
        increment: f64,
        member: impl Into<TypedValue>,
    ) -> Result<&mut Self, Error> {
        let increment = TypedValue::from_f64(increment)?;
        Ok(self.add_command(Cmd::new("ZINCRBY").arg(key).arg(increment).arg(member)))
    }
}

// ── Hashes ──────────────────────────────────────────────────────────────

pub trait HashCommands: CommandSink {
    fn hset<F, V>(
        &mut self,
        key: impl Into<TypedValue>,
        fields: impl IntoIterator<Item = (F, V)>,
    ) -> &mut Self
    where
        F: Into<TypedValue>,
        V: Into<TypedValue>,
    {
        let mut cmd = Cmd::new("HSET").arg(key);
        for (field, value) in fields {
            cmd = cmd.arg(field).arg(value);
        }
        self.add_command(cmd)
    }

    fn hget(&mut self, key: impl Into<TypedValue>, field: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("HGET").arg(key).arg(field))
    }

    fn hdel(
        &mut self,
        key: impl Into<TypedValue>,
        fields: impl IntoIterator<Item = impl Into<TypedValue>>,
    ) -> &mut Self {
        self.add_command(Cmd::new("HDEL").arg(key).args(fields))
    }

    fn hgetall(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("HGETALL").arg(key))
    }
}

// ── Keys and custom commands ────────────────────────────────────────────

pub trait GenericCommands: CommandSink {
    fn del(&mut self, keys: impl IntoIterator<Item = impl Into<TypedValue>>) -> &mut Self {
        self.add_command(Cmd::new("DEL").args(keys))
    }

    fn exists(&mut self, keys: impl IntoIterator<Item = impl Into<TypedValue>>) -> &mut Self {
        self.add_command(Cmd::new("EXISTS").args(keys))
    }

    fn expire(&mut self, key: impl Into<TypedValue>, seconds: u64) -> &mut Self {
        self.add_command(Cmd::new("EXPIRE").arg(key).arg(seconds))
    }

    fn ttl(&mut self, key: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("TTL").arg(key))
    }

    /// Any command, given as its full argument list with the name first.
    ///
    /// Keys are located the same way as for built-in commands, so a custom
    /// `GET k` routes like [`StringCommands::get`]. Fails with
    /// [`Error::Encoding`] if the list is empty or the name is not text.
    fn custom_command(
        &mut self,
        args: impl IntoIterator<Item = impl Into<TypedValue>>,
    ) -> Result<&mut Self, Error> {
        let cmd = Cmd::from_parts(args.into_iter().map(Into::into).collect())?;
        Ok(self.add_command(cmd))
    }
}

// ── Server management ───────────────────────────────────────────────────

/// `INFO` sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoSection {
    Server,
    Clients,
    Memory,
    Persistence,
    Stats,
    Replication,
    Cpu,
    Commandstats,
    Latencystats,
    Sentinel,
    Cluster,
    Modules,
    Keyspace,
    Errorstats,
    All,
    Default,
    Everything,
}

impl InfoSection {
    /// The wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoSection::Server => "server",
            InfoSection::Clients => "clients",
            InfoSection::Memory => "memory",
            InfoSection::Persistence => "persistence",
            InfoSection::Stats => "stats",
            InfoSection::Replication => "replication",
            InfoSection::Cpu => "cpu",
            InfoSection::Commandstats => "commandstats",
            InfoSection::Latencystats => "latencystats",
            InfoSection::Sentinel => "sentinel",
            InfoSection::Cluster => "cluster",
            InfoSection::Modules => "modules",
            InfoSection::Keyspace => "keyspace",
            InfoSection::Errorstats => "errorstats",
            InfoSection::All => "all",
            InfoSection::Default => "default",
            InfoSection::Everything => "everything",
        }
    }
}

impl fmt::Display for InfoSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyless commands. In a cluster they follow the batch's route, a random
/// primary unless the caller asks otherwise.
pub trait ServerManagementCommands: CommandSink {
    /// `INFO` with the server's default sections.
    fn info(&mut self) -> &mut Self {
        self.add_command(Cmd::new("INFO"))
    }

    /// `INFO section [section ...]`
    fn info_sections(&mut self, sections: &[InfoSection]) -> &mut Self {
        self.add_command(Cmd::new("INFO").args(sections.iter().map(InfoSection::as_str)))
    }

    fn ping(&mut self) -> &mut Self {
        self.add_command(Cmd::new("PING"))
    }

    fn dbsize(&mut self) -> &mut Self {
        self.add_command(Cmd::new("DBSIZE"))
    }

    fn config_get(&mut self, parameter: impl Into<TypedValue>) -> &mut Self {
        self.add_command(Cmd::new("CONFIG").arg("GET").arg(parameter))
    }

    fn config_set(
        &mut self,
        parameter: impl Into<TypedValue>,
        value: impl Into<TypedValue>,
    ) -> &mut Self {
        self.add_command(Cmd::new("CONFIG").arg("SET").arg(parameter).arg(value))
    }

    fn flushdb(&mut self) -> &mut Self {
        self.add_command(Cmd::new("FLUSHDB"))
    }
}

impl<T: CommandSink> StringCommands for T {}
impl<T: CommandSink> ListCommands for T {}
impl<T: CommandSink> SetCommands for T {}
impl<T: CommandSink> SortedSetCommands for T {}
impl<T: CommandSink> HashCommands for T {}
impl<T: CommandSink> GenericCommands for T {}
impl<T: CommandSink> ServerManagementCommands for T {}
