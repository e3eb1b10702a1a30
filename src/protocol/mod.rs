//! Wire Protocol
//!
//! Requests are inline text lines, replies are typed frames:
//!
//! ```text
//! client ──►  GET name\r\n
//! server ──►  $5\r\nquill\r\n
//! ```
//!
//! ## Modules
//!
//! - `inline`: extracting request lines and splitting them into arguments
//! - `types`: the `RespValue` reply enum and its serialization
//! - `parser`: incremental decoder for replies (client side)
//!
//! ## Example
//!
//! ```
//! use quillkv::protocol::{inline, parse_reply, RespValue};
//! use bytes::Bytes;
//!
//! let args = inline::split_args(&Bytes::from("SET name quill\r\n"));
//! assert_eq!(args.len(), 3);
//!
//! let (reply, consumed) = parse_reply(b"+OK\r\n").unwrap().unwrap();
//! assert_eq!(reply, RespValue::ok());
//! assert_eq!(consumed, 5);
//! ```

pub mod inline;
pub mod parser;
pub mod types;

pub use parser::{parse_reply, ParseError, ParseResult, ReplyParser};
pub use types::RespValue;
