//! Client Session
//!
//! One [`Client`] exists per accepted connection. It owns everything the
//! protocol state machine needs: the query buffer bytes are read into, the
//! argument vector of the command being dispatched, and the queue of reply
//! objects waiting to be written.
//!
//! ## Session Lifecycle
//!
//! ```text
//!  read-ready ──► read_from() ──► query_buf
//!                                    │
//!                                    ▼
//!                           read_command() ──► argv ──► dispatch
//!                                    ▲                     │
//!                                    └──── more lines ─────┘
//!
//!  handler ──► add_reply*() ──► reply queue ──► write_to() on write-ready
//! ```
//!
//! The session never touches the socket itself: reads and writes go
//! through `std::io::Read` / `Write`, so the state machine can be driven by
//! any stream.

use crate::protocol::inline::split_args;
use crate::protocol::types::bulk_header;
use crate::protocol::RespValue;
use crate::storage::{ByteBuf, Object, RObj, Shared};
use bytes::Bytes;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::trace;

/// Bytes read from the socket per read event.
pub const IOBUF_LEN: usize = 1024;

/// Bytes written to one client per write event before yielding.
pub const MAX_WRITE_PER_EVENT: usize = 64 * 1024;

/// Longest unterminated request line accepted (256 MB).
pub const REQUEST_MAX_SIZE: usize = 256 * 1024 * 1024;

/// Session state bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientFlags(u8);

impl ClientFlags {
    pub const SLAVE: ClientFlags = ClientFlags(1);
    pub const MASTER: ClientFlags = ClientFlags(2);
    pub const MONITOR: ClientFlags = ClientFlags(4);
    pub const MULTI: ClientFlags = ClientFlags(8);
    pub const BLOCKED: ClientFlags = ClientFlags(16);

    pub fn contains(self, other: ClientFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ClientFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ClientFlags) {
        self.0 &= !other.0;
    }
}

/// Errors that end a client session.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Read or write failed with something other than would-block.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer sent more than the allowed bytes without a line terminator.
    #[error("request too large: {len} bytes without a newline (max: {max})")]
    QueryTooLarge { len: usize, max: usize },
}

/// Result of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were appended to the query buffer.
    Data(usize),
    /// Nothing to read right now.
    WouldBlock,
    /// The peer closed the connection.
    Closed,
}

/// Result of one write-ready flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The reply queue is empty.
    Drained,
    /// The socket stopped accepting bytes; wait for the next write event.
    Blocked,
    /// The per-event byte cap was reached with replies still queued.
    Capped,
}

#[derive(Debug)]
pub struct Client {
    id: u64,
    /// Index of the selected database.
    pub db: usize,
    query_buf: ByteBuf,
    /// Prefix of `query_buf` already known to hold no newline.
    scanned: usize,
    /// Arguments of the command being dispatched.
    pub argv: Vec<Bytes>,
    /// Length of a pending bulk argument. Only inline requests are parsed,
    /// so this is cleared per command and never drives a read.
    pub bulk_len: Option<usize>,
    reply: VecDeque<RObj>,
    /// Bytes of the head reply object already written.
    sent_len: usize,
    /// Unix ms of the last read or write.
    last_interaction: i64,
    pub flags: ClientFlags,
    max_query_len: usize,
}

impl Client {
    pub fn new(id: u64, now_ms: i64) -> Self {
        Self {
            id,
            db: 0,
            query_buf: ByteBuf::empty(),
            scanned: 0,
            argv: Vec::new(),
            bulk_len: None,
            reply: VecDeque::new(),
            sent_len: 0,
            last_interaction: now_ms,
            flags: ClientFlags::default(),
            max_query_len: REQUEST_MAX_SIZE,
        }
    }

    /// Overrides the unterminated-line limit.
    pub fn with_max_query_len(mut self, max: usize) -> Self {
        self.max_query_len = max;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn last_interaction(&self) -> i64 {
        self.last_interaction
    }

    pub fn query_len(&self) -> usize {
        self.query_buf.len()
    }

    pub fn is_blocked(&self) -> bool {
        self.flags.contains(ClientFlags::BLOCKED)
    }

    /// Reads one chunk of at most [`IOBUF_LEN`] bytes into the query buffer.
    pub fn read_from<R: Read>(&mut self, src: &mut R, now_ms: i64) -> Result<ReadOutcome, ClientError> {
        let mut chunk = [0u8; IOBUF_LEN];
        loop {
            return match src.read(&mut chunk) {
                Ok(0) => Ok(ReadOutcome::Closed),
                Ok(n) => {
                    self.query_buf.append(&chunk[..n]);
                    self.last_interaction = now_ms;
                    trace!(client = self.id, bytes = n, "Read query data");
                    Ok(ReadOutcome::Data(n))
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e.into()),
            };
        }
    }

    /// Extracts the next non-empty request line from the query buffer into
    /// `argv`. Returns `false` once no complete line remains.
    pub fn read_command(&mut self) -> Result<bool, ClientError> {
        loop {
            match self.query_buf.find_from(b'\n', self.scanned) {
                Some(pos) => {
                    self.scanned = 0;
                    let line = self.query_buf.split_to(pos + 1);
                    let args = split_args(&line);
                    if args.is_empty() {
                        continue;
                    }
                    self.argv = args;
                    return Ok(true);
                }
                None if self.query_buf.len() > self.max_query_len => {
                    return Err(ClientError::QueryTooLarge {
                        len: self.query_buf.len(),
                        max: self.max_query_len,
                    });
                }
                None => {
                    self.scanned = self.query_buf.len();
                    return Ok(false);
                }
            }
        }
    }

    /// Clears per-command state.
    pub fn reset(&mut self) {
        self.argv.clear();
        self.bulk_len = None;
    }

    /// Queues a reply object. Integer-encoded values are queued as their
    /// decimal text.
    pub fn add_reply(&mut self, obj: &RObj) {
        self.reply.push_back(Object::decoded(obj));
    }

    pub fn add_reply_value(&mut self, value: RespValue) {
        self.reply.push_back(Object::reply(&value));
    }

    pub fn add_reply_error(&mut self, msg: impl Into<String>) {
        self.add_reply_value(RespValue::error(msg));
    }

    /// Queues an integer reply, reusing the shared objects for 0, 1 and -1.
    pub fn add_reply_integer(&mut self, n: i64, shared: &Shared) {
        match n {
            0 => self.add_reply(&shared.czero),
            1 => self.add_reply(&shared.cone),
            -1 => self.add_reply(&shared.cnegone),
            _ => self.add_reply_value(RespValue::integer(n)),
        }
    }

    /// Queues `obj` as a bulk string: a length header, the object itself
    /// and the shared CRLF.
    pub fn add_reply_bulk(&mut self, obj: &RObj, shared: &Shared) {
        let obj = Object::decoded(obj);
        self.reply
            .push_back(Object::string(bulk_header(obj.len())));
        self.reply.push_back(obj);
        self.add_reply(&shared.crlf);
    }

    pub fn has_pending_replies(&self) -> bool {
        !self.reply.is_empty()
    }

    pub fn pending_replies(&self) -> usize {
        self.reply.len()
    }

    /// Writes queued replies until the queue drains, the stream would
    /// block, or more than [`MAX_WRITE_PER_EVENT`] bytes went out.
    pub fn write_to<W: Write>(&mut self, dst: &mut W, now_ms: i64) -> Result<WriteOutcome, ClientError> {
        let mut total = 0usize;

        while let Some(obj) = self.reply.front() {
            let data = obj.to_bytes();
            if data.is_empty() {
                self.reply.pop_front();
                continue;
            }

            match dst.write(&data[self.sent_len..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    self.sent_len += n;
                    total += n;
                    if self.sent_len == data.len() {
                        self.reply.pop_front();
                        self.sent_len = 0;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }

            if total > MAX_WRITE_PER_EVENT {
                break;
            }
        }

        if total > 0 {
            self.last_interaction = now_ms;
            trace!(client = self.id, bytes = total, "Wrote replies");
        }

        Ok(if self.reply.is_empty() {
            WriteOutcome::Drained
        } else if total > MAX_WRITE_PER_EVENT {
            WriteOutcome::Capped
        } else {
            WriteOutcome::Blocked
        })
    }
}
