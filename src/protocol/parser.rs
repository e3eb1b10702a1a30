//! Incremental Reply Parser
//!
//! Decodes server replies from a byte buffer that may hold a partial frame.
//! The command-line client and the socket tests use it to read what the
//! server sends back.
//!
//! ## How the Parser Works
//!
//! [`ReplyParser::parse`] returns:
//! - `Ok(Some((value, consumed)))` - a complete reply, `consumed` bytes used
//! - `Ok(None)` - the reply is incomplete, read more and retry
//! - `Err(ParseError)` - the bytes are not a valid reply
//!
//! The caller appends socket data to a buffer, parses, and advances the
//! buffer by `consumed` on success.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur while decoding a reply.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a status or error line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk length is negative but not -1
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Missing CRLF after a bulk payload
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The payload exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk payload (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Stateless decoder for reply frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplyParser;

impl ReplyParser {
    pub fn new() -> Self {
        Self
    }

    /// Attempts to decode one reply from the front of `buf`.
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&first) = buf.first() else {
            return Ok(None);
        };

        match first {
            prefix::SIMPLE_STRING => {
                Ok(parse_line(buf)?.map(|(s, n)| (RespValue::SimpleString(s), n)))
            }
            prefix::ERROR => Ok(parse_line(buf)?.map(|(s, n)| (RespValue::Error(s), n))),
            prefix::INTEGER => match parse_line(buf)? {
                Some((s, n)) => {
                    let value: i64 = s
                        .parse()
                        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;
                    Ok(Some((RespValue::Integer(value), n)))
                }
                None => Ok(None),
            },
            prefix::BULK_STRING => parse_bulk_string(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }
}

/// Reads the text between the prefix byte and the first CRLF.
fn parse_line(buf: &[u8]) -> ParseResult<Option<(String, usize)>> {
    match find_crlf(&buf[1..]) {
        Some(pos) => {
            let s = std::str::from_utf8(&buf[1..1 + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            // +1 for prefix, +2 for CRLF
            Ok(Some((s.to_string(), 1 + pos + 2)))
        }
        None => Ok(None),
    }
}

/// Parses a bulk string: `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let Some((length_str, data_start)) = parse_line(buf)? else {
        return Ok(None);
    };

    let length: i64 = length_str
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;

    if length == -1 {
        return Ok(Some((RespValue::Null, data_start)));
    }
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let total_needed = data_start + length + 2;
    if buf.len() < total_needed {
        return Ok(None);
    }

    if &buf[data_start + length..total_needed] != CRLF {
        return Err(ParseError::ProtocolError(
            "bulk string missing trailing CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((RespValue::BulkString(data), total_needed)))
}

/// Finds the position of CRLF in the buffer.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Decodes a single reply from `buf`.
pub fn parse_reply(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    ReplyParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let (value, consumed) = parse_reply(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_incomplete() {
        assert!(parse_reply(b"").unwrap().is_none());
        assert!(parse_reply(b"+OK").unwrap().is_none());
        assert!(parse_reply(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_reply(b"$5").unwrap().is_none());
    }

    #[test]
    fn test_parse_error() {
        let (value, consumed) = parse_reply(b"-ERR unknown command 'FOO'\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(
            value,
            RespValue::Error("ERR unknown command 'FOO'".to_string())
        );
        assert_eq!(consumed, 28);
    }

    #[test]
    fn test_parse_integer() {
        let (value, consumed) = parse_reply(b":-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(-1));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_bulk_string() {
        let (value, consumed) = parse_reply(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from("hello")));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_null_and_empty_bulk() {
        let (value, consumed) = parse_reply(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Null);
        assert_eq!(consumed, 5);

        let (value, consumed) = parse_reply(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::new()));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_binary_bulk_with_embedded_crlf() {
        let (value, _) = parse_reply(b"$4\r\na\r\nb\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(Bytes::from(&b"a\r\nb"[..])));
    }

    #[test]
    fn test_parse_consecutive_replies() {
        let buf = b"+OK\r\n$1\r\nv\r\n";
        let (first, n) = parse_reply(buf).unwrap().unwrap();
        let (second, m) = parse_reply(&buf[n..]).unwrap().unwrap();
        assert_eq!(first, RespValue::ok());
        assert_eq!(second, RespValue::bulk_string("v"));
        assert_eq!(n + m, buf.len());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_reply(b"@x\r\n"), Err(ParseError::UnknownPrefix(b'@')));
        assert!(matches!(
            parse_reply(b":nope\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert_eq!(
            parse_reply(b"$-2\r\n"),
            Err(ParseError::InvalidBulkLength(-2))
        );
        assert!(matches!(
            parse_reply(b"$1\r\nab\r\n"),
            Err(ParseError::ProtocolError(_))
        ));
    }
}
