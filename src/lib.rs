//! # QuillKV - A Single-Threaded, Event-Driven Key-Value Server
//!
//! QuillKV keeps string keys in memory and serves them over a small text
//! protocol. One thread does everything: a readiness reactor multiplexes the
//! client sockets, and every command runs to completion between two polls.
//!
//! ## Features
//!
//! - **Event Reactor**: `mio` readiness loop with descriptor slots and timers
//! - **Chained Hash Table**: power-of-two buckets, stop-the-world doubling
//! - **Lazy Expiration**: expired keys are removed when they are touched
//! - **Shared Replies**: values and fixed replies are `Rc`-shared, never copied
//! - **Pipelining**: every complete line in a read is dispatched in order
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               QuillKV                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Reactor    │───>│   Client    │───>│  Command    │                  │
//! │  │ (mio poll)  │    │  session    │    │  dispatch   │                  │
//! │  └──────┬──────┘    └──────▲──────┘    └──────┬──────┘                  │
//! │         │                  │ replies          │                         │
//! │         │ timer            └──────────────────┤                         │
//! │         ▼                                     ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │ server_cron │    │         Databases (Db × N)                   │    │
//! │  │ (stats log) │    │  ┌──────────────────┐ ┌───────────────────┐  │    │
//! │  └─────────────┘    │  │ keyspace: Dict   │ │ expires: Dict     │  │    │
//! │                     │  └──────────────────┘ └───────────────────┘  │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use quillkv::config::Config;
//! use quillkv::server::Server;
//!
//! let mut server = Server::bind(Config::default()).unwrap();
//! server.run().unwrap();
//! ```
//!
//! ## Supported Commands
//!
//! - `GET`, `SET`, `SETNX`, `DEL`, `EXISTS`
//! - `EXPIRE`, `EXPIREAT`, `TTL`, `PERSIST`
//! - `PING`, `ECHO`, `SELECT`, `DBSIZE`, `FLUSHDB`, `INFO`, `SHUTDOWN`, `QUIT`
//!
//! ## Module Overview
//!
//! - [`storage`]: byte buffer, hash table, value objects, databases
//! - [`reactor`]: the event loop
//! - [`protocol`]: inline requests and typed replies
//! - [`connection`]: per-client session state
//! - [`commands`]: command registry, dispatch and implementations
//! - [`server`]: the reactor handlers and housekeeping timer
//! - [`config`]: configuration file loader
//! - [`cli`]: command-line client

pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod reactor;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError};
pub use protocol::{ParseError, ReplyParser, RespValue};
pub use server::{Server, ServerError};
pub use storage::{Db, Dict, Object};

/// The default port QuillKV listens on
pub const DEFAULT_PORT: u16 = 6379;

/// The host the command-line client connects to by default
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of QuillKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
