//! Command Module
//!
//! Resolves request lines to command descriptors, validates them and runs
//! their handlers against the server state.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Client session  │  (connection module)
//! └────────┬────────┘
//!          │ argv
//!          ▼
//! ┌─────────────────┐
//! │ process_command │  (dispatch)
//! │                 │
//! │  - quit         │
//! │  - lookup       │  CommandTable (case-insensitive Dict)
//! │  - arity        │
//! │  - call         │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Db keyspace     │  (storage module)
//! └─────────────────┘
//! ```
//!
//! Handlers do not return replies; they queue them on the client.

pub mod dispatch;
pub mod handler;
pub mod table;

use crate::server::ServerStats;
use crate::storage::{Db, Shared};

pub use dispatch::{process_command, process_input_buffer, Processed};
pub use table::{Command, CommandFlags, CommandProc, CommandTable, COMMANDS};

/// Server state a command may read or modify.
pub struct CommandCtx<'a> {
    pub dbs: &'a mut [Db],
    pub shared: &'a Shared,
    pub commands: &'a CommandTable,
    pub stats: &'a mut ServerStats,
    /// Wall-clock time for this batch of commands, Unix ms.
    pub now_ms: i64,
    pub connected_clients: usize,
    /// Set by `SHUTDOWN`; the server stops after the current event.
    pub shutdown: bool,
}
