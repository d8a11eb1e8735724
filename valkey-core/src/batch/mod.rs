//! Batches: ordered command lists submitted in one call.
//!
//! Commands are added through the family traits in [`commands`] (bring
//! them in with `use valkey_core::batch::prelude::*`). Each call appends
//! exactly one [`Cmd`] and returns the batch for chaining:
//!
//! ```
//! use valkey_core::Batch;
//! use valkey_core::batch::prelude::*;
//!
//! let mut batch = Batch::pipeline();
//! batch.set("k1", "v1").get("k1").incr("hits");
//! assert_eq!(batch.len(), 3);
//! ```

pub mod commands;

pub use commands::{
    CommandSink, Expiry, GenericCommands, HashCommands, InfoSection, ListCommands,
    ServerManagementCommands, SetCommands, SetCondition, SetOptions, SortedSetCommands,
    StringCommands,
};

use crate::cmd::Cmd;

/// Brings every command-family trait into scope.
pub mod prelude {
    pub use super::commands::{
        GenericCommands, HashCommands, ListCommands, ServerManagementCommands, SetCommands,
        SortedSetCommands, StringCommands,
    };
}

/// How a batch is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atomicity {
    /// `MULTI` ... `EXEC` on one node; all keys must share a slot.
    Atomic,
    /// Pipelined, possibly across nodes; each command stands alone.
    NonAtomic,
}

/// An ordered list of commands.
///
/// Commands are only ever appended. The batch is not consumed by
/// execution and can be submitted again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    commands: Vec<Cmd>,
    atomicity: Atomicity,
}

impl Batch {
    pub fn new(atomicity: Atomicity) -> Self {
        Self {
            commands: Vec::new(),
            atomicity,
        }
    }

    /// A transaction.
    pub fn atomic() -> Self {
        Self::new(Atomicity::Atomic)
    }

    /// A plain pipeline.
    pub fn pipeline() -> Self {
        Self::new(Atomicity::NonAtomic)
    }

    pub fn atomicity(&self) -> Atomicity {
        self.atomicity
    }

    #[inline]
    pub fn is_atomic(&self) -> bool {
        self.atomicity == Atomicity::Atomic
    }

    pub fn commands(&self) -> &[Cmd] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append a prebuilt command.
    pub fn push(&mut self, cmd: Cmd) -> &mut Self {
        self.commands.push(cmd);
        self
    }
}

impl commands::CommandSink for Batch {
    fn add_command(&mut self, cmd: Cmd) -> &mut Self {
        self.push(cmd)
    }
}
