//! Value Objects
//!
//! Every value stored in a database and every reply queued on a client is
//! an [`Object`] behind an `Rc`. Sharing is the point: a `GET` reply queues
//! the very object the keyspace holds, and the fixed replies (`+OK`, `:1`,
//! CRLF, ...) are allocated once at startup and handed out by reference.
//! The object is freed when the last table slot or reply queue drops it.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::rc::Rc;

/// A shared, reference-counted value.
pub type RObj = Rc<Object>;

/// Longest decimal `i64` representation ("-9223372036854775808").
const MAX_INT_ENCODED_LEN: usize = 20;

/// How a string value is represented in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    /// The bytes as received.
    Raw(Bytes),
    /// A decimal string stored as the integer it spells.
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    encoding: Encoding,
}

impl Object {
    /// Creates a raw-encoded string object.
    pub fn string(data: impl Into<Bytes>) -> RObj {
        Rc::new(Self {
            encoding: Encoding::Raw(data.into()),
        })
    }

    /// Creates an integer-encoded string object.
    pub fn from_int(n: i64) -> RObj {
        Rc::new(Self {
            encoding: Encoding::Int(n),
        })
    }

    /// Creates an object holding the wire form of a reply.
    pub fn reply(value: &RespValue) -> RObj {
        Self::string(value.serialize())
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn encoding_name(&self) -> &'static str {
        match self.encoding {
            Encoding::Raw(_) => "raw",
            Encoding::Int(_) => "int",
        }
    }

    /// Returns the string bytes, rendering integer encodings back to text.
    pub fn to_bytes(&self) -> Bytes {
        match &self.encoding {
            Encoding::Raw(b) => b.clone(),
            Encoding::Int(n) => Bytes::from(n.to_string()),
        }
    }

    /// Length of the string form in bytes.
    pub fn len(&self) -> usize {
        match &self.encoding {
            Encoding::Raw(b) => b.len(),
            Encoding::Int(n) => n.to_string().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Switches a raw object to integer encoding when its bytes are exactly
    /// the canonical decimal form of an `i64`, so decoding gives back the
    /// same bytes. Anything else is returned unchanged.
    pub fn try_encode(obj: RObj) -> RObj {
        let Encoding::Raw(bytes) = &obj.encoding else {
            return obj;
        };
        if bytes.is_empty() || bytes.len() > MAX_INT_ENCODED_LEN {
            return obj;
        }
        let parsed = std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok().filter(|n| n.to_string() == s));
        match parsed {
            Some(n) => Self::from_int(n),
            None => obj,
        }
    }

    /// Returns a raw-encoded version of `obj`: the same object when it is
    /// already raw, a fresh one otherwise.
    pub fn decoded(obj: &RObj) -> RObj {
        match obj.encoding {
            Encoding::Raw(_) => Rc::clone(obj),
            Encoding::Int(n) => Self::string(n.to_string()),
        }
    }
}

/// Reply objects allocated once and shared by every client.
#[derive(Debug)]
pub struct Shared {
    pub crlf: RObj,
    pub ok: RObj,
    pub pong: RObj,
    pub czero: RObj,
    pub cone: RObj,
    pub cnegone: RObj,
    pub nullbulk: RObj,
    pub syntaxerr: RObj,
    pub notinterr: RObj,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            crlf: Object::string(Bytes::from_static(b"\r\n")),
            ok: Object::reply(&RespValue::ok()),
            pong: Object::reply(&RespValue::pong()),
            czero: Object::reply(&RespValue::integer(0)),
            cone: Object::reply(&RespValue::integer(1)),
            cnegone: Object::reply(&RespValue::integer(-1)),
            nullbulk: Object::reply(&RespValue::null()),
            syntaxerr: Object::reply(&RespValue::error("ERR syntax error")),
            notinterr: Object::reply(&RespValue::error(
                "ERR value is not an integer or out of range",
            )),
        }
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}
