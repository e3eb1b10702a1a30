//! Storage Module
//!
//! In-memory data structures behind the keyspace.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Db (one per slot)                 │
//! │   ┌────────────────────────┐  ┌────────────────────────┐ │
//! │   │ keyspace: Dict         │  │ expires: Dict          │ │
//! │   │   Bytes ──► RObj       │  │   Bytes ──► unix ms    │ │
//! │   └────────────────────────┘  └────────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//!             │                          ▲
//!             ▼                          │ lazy expiry on access
//!   ┌────────────────────┐        ┌─────────────┐
//!   │ Object (Rc-shared) │        │    Clock    │
//!   │   Raw(Bytes)|Int   │        └─────────────┘
//!   └────────────────────┘
//! ```
//!
//! - [`buffer`]: growable byte buffer with amortized append
//! - [`dict`]: chained hash table with power-of-two doubling
//! - [`object`]: reference-counted value cells and shared replies
//! - [`db`]: keyspace + expiration index
//! - [`clock`]: wall-clock abstraction
//!
//! ## Example
//!
//! ```
//! use quillkv::storage::{Db, Object};
//! use bytes::Bytes;
//!
//! let mut db = Db::new(0);
//! db.set(Bytes::from("name"), Object::string("quill"));
//! db.set_expire(Bytes::from("name"), 1_000);
//!
//! assert!(db.lookup_read(&Bytes::from("name"), 500).is_some());
//! assert!(db.lookup_read(&Bytes::from("name"), 1_500).is_none());
//! ```

pub mod buffer;
pub mod clock;
pub mod db;
pub mod dict;
pub mod object;

pub use buffer::ByteBuf;
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{Db, DbStats};
pub use dict::{BytesKey, CaseInsensitiveKey, Dict, DictError, DictType, IntKey};
pub use object::{Encoding, Object, RObj, Shared};
