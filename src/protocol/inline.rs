//! Inline Requests
//!
//! A request is one line of whitespace-separated tokens ending in `\n`,
//! optionally preceded by `\r`:
//!
//! ```text
//! SET name quill\r\n
//! ```
//!
//! There is no length-prefixed framing, so arguments cannot contain
//! whitespace or newlines.

use bytes::Bytes;

/// Strips the trailing `\n` and an optional `\r` before it.
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Splits a request line into its arguments, dropping empty tokens.
///
/// Each argument is copied into its own allocation. Arguments end up as
/// keys and values in the keyspace, and a slice would pin the whole read
/// buffer it came from.
pub fn split_args(line: &[u8]) -> Vec<Bytes> {
    let body = trim_line_end(line);
    let mut args = Vec::new();
    let mut start: Option<usize> = None;

    for (i, b) in body.iter().enumerate() {
        match (b.is_ascii_whitespace(), start) {
            (true, Some(s)) => {
                args.push(Bytes::copy_from_slice(&body[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        args.push(Bytes::copy_from_slice(&body[s..]));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        split_args(&Bytes::from(line.to_string()))
            .into_iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_split_simple() {
        assert_eq!(args("SET name quill\r\n"), vec!["SET", "name", "quill"]);
        assert_eq!(args("PING\n"), vec!["PING"]);
        assert_eq!(args("GET k"), vec!["GET", "k"]);
    }

    #[test]
    fn test_split_drops_empty_tokens() {
        assert_eq!(args("  DEL   a \t b  \r\n"), vec!["DEL", "a", "b"]);
        assert!(args("\r\n").is_empty());
        assert!(args("   \n").is_empty());
    }

    #[test]
    fn test_args_do_not_alias_line() {
        let line = Bytes::from(format!("SET big {}\r\n", "x".repeat(4096)));
        let range = line.as_ptr_range();
        for arg in split_args(&line) {
            assert!(!range.contains(&arg.as_ptr()));
        }
    }

    #[test]
    fn test_trim_line_end() {
        assert_eq!(trim_line_end(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_end(b"abc\n"), b"abc");
        assert_eq!(trim_line_end(b"abc"), b"abc");
        assert_eq!(trim_line_end(b"\r\n"), b"");
    }
}
