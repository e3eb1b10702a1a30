//! Command descriptors and the registry that resolves names to them.

use crate::commands::handler::*;
use crate::commands::CommandCtx;
use crate::connection::Client;
use crate::storage::{CaseInsensitiveKey, Dict};
use bytes::Bytes;
use std::fmt;

/// Signature shared by every command implementation.
pub type CommandProc = fn(&mut Client, &mut CommandCtx<'_>);

/// Descriptor flag bits.
///
/// Dispatch does not act on these yet. There is no memory limit to enforce
/// `DENY_OOM` against, and every request is parsed inline, so `BULK` and
/// `INLINE` only describe how each command's arguments are meant to arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandFlags(u8);

impl CommandFlags {
    /// The last argument is a payload (sent inline, as the only framing
    /// parsed is the request line).
    pub const BULK: CommandFlags = CommandFlags(1);
    pub const INLINE: CommandFlags = CommandFlags(2);
    /// Refused when memory is low.
    pub const DENY_OOM: CommandFlags = CommandFlags(4);

    pub const fn union(self, other: CommandFlags) -> CommandFlags {
        CommandFlags(self.0 | other.0)
    }

    pub fn contains(self, other: CommandFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

pub struct Command {
    pub name: &'static str,
    pub proc: CommandProc,
    /// Positive: exact argument count (name included). Negative: at least
    /// `-arity` arguments.
    pub arity: i32,
    pub flags: CommandFlags,
}

impl Command {
    pub fn arity_ok(&self, argc: usize) -> bool {
        let argc = argc as i64;
        let arity = self.arity as i64;
        if arity >= 0 {
            argc == arity
        } else {
            argc >= -arity
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("flags", &self.flags)
            .finish()
    }
}

const INLINE: CommandFlags = CommandFlags::INLINE;
const BULK_DENY_OOM: CommandFlags = CommandFlags::BULK.union(CommandFlags::DENY_OOM);

/// Every command the server understands. `quit` is handled by the
/// dispatcher before lookup.
pub static COMMANDS: &[Command] = &[
    Command { name: "get", proc: get_command, arity: 2, flags: INLINE },
    Command { name: "set", proc: set_command, arity: 3, flags: BULK_DENY_OOM },
    Command { name: "setnx", proc: setnx_command, arity: 3, flags: BULK_DENY_OOM },
    Command { name: "del", proc: del_command, arity: -2, flags: INLINE },
    Command { name: "exists", proc: exists_command, arity: 2, flags: INLINE },
    Command { name: "expire", proc: expire_command, arity: 3, flags: INLINE },
    Command { name: "expireat", proc: expireat_command, arity: 3, flags: INLINE },
    Command { name: "ttl", proc: ttl_command, arity: 2, flags: INLINE },
    Command { name: "persist", proc: persist_command, arity: 2, flags: INLINE },
    Command { name: "ping", proc: ping_command, arity: 1, flags: INLINE },
    Command { name: "echo", proc: echo_command, arity: 2, flags: CommandFlags::BULK },
    Command { name: "select", proc: select_command, arity: 2, flags: INLINE },
    Command { name: "dbsize", proc: dbsize_command, arity: 1, flags: INLINE },
    Command { name: "flushdb", proc: flushdb_command, arity: 1, flags: INLINE },
    Command { name: "info", proc: info_command, arity: 1, flags: INLINE },
    Command { name: "shutdown", proc: shutdown_command, arity: 1, flags: INLINE },
];

/// Case-insensitive name → descriptor registry.
#[derive(Debug)]
pub struct CommandTable {
    commands: Dict<Bytes, &'static Command, CaseInsensitiveKey>,
}

impl CommandTable {
    pub fn new() -> Self {
        let mut commands = Dict::new(CaseInsensitiveKey);
        for cmd in COMMANDS {
            // Names in COMMANDS are unique.
            let _ = commands.add(Bytes::from_static(cmd.name.as_bytes()), cmd);
        }
        Self { commands }
    }

    pub fn lookup(&self, name: &Bytes) -> Option<&'static Command> {
        self.commands.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}
