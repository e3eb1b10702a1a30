//! Connection Module
//!
//! Per-connection session state. The server's reactor owns the sockets; a
//! session only sees them as `Read` / `Write` streams.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Reactor (server.rs)                         │
//! │   accept ──► Client::new        read-ready / write-ready    │
//! └──────────────────────┬───────────────────────┬──────────────┘
//!                        │                       │
//!                        ▼                       ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Client                                 │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ query_buf   │───>│ argv        │───>│ dispatch    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ reply queue │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Pipelining**: every complete line in the buffer is dispatched
//! - **Shared replies**: queued objects are `Rc` clones, never copies
//! - **Partial writes**: the byte offset into the head reply survives
//!   between write events
//! - **Backpressure**: at most 64 KB per client per write event

pub mod client;

pub use client::{
    Client, ClientError, ClientFlags, ReadOutcome, WriteOutcome, IOBUF_LEN, MAX_WRITE_PER_EVENT,
    REQUEST_MAX_SIZE,
};
