//! Command-Line Client
//!
//! A thin client for poking at a running server:
//!
//! ```text
//! quillkv-cli [-h host] [-p port] [cmd arg ...]
//! ```
//!
//! With a command on the command line it sends that one request, prints the
//! decoded reply and exits. Without one it reads request lines from standard
//! input until EOF or a bare `quit` / `exit`.
//!
//! Requests are sent as inline lines, so arguments cannot contain spaces or
//! line breaks.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{parse_reply, ParseError, RespValue};
use crate::{DEFAULT_HOST, DEFAULT_PORT};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("Could not connect to QuillKV at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    #[error("connection closed by server")]
    Closed,
}

/// Where to connect and what to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub host: String,
    pub port: u16,
    /// Empty means interactive mode.
    pub command: Vec<String>,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            command: Vec::new(),
        }
    }
}

impl CliArgs {
    /// Parses the arguments after the program name.
    ///
    /// Options are only recognised before the first command word.
    pub fn parse<I, S>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = CliArgs::default();
        let mut iter = args.into_iter().map(Into::into);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" => {
                    parsed.host = iter
                        .next()
                        .ok_or_else(|| CliError::Usage("-h requires a host".to_string()))?;
                }
                "-p" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| CliError::Usage("-p requires a port".to_string()))?;
                    parsed.port = value
                        .parse()
                        .map_err(|_| CliError::Usage(format!("invalid port '{}'", value)))?;
                }
                _ => {
                    parsed.command.push(arg);
                    parsed.command.extend(iter);
                    break;
                }
            }
        }
        Ok(parsed)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_interactive(&self) -> bool {
        self.command.is_empty()
    }
}

/// True for the words that end an interactive session.
pub fn is_quit(word: &str) -> bool {
    word.eq_ignore_ascii_case("quit") || word.eq_ignore_ascii_case("exit")
}

/// Builds the inline request line for `args`.
pub fn encode_request<S: AsRef<str>>(args: &[S]) -> Vec<u8> {
    let mut line = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(b' ');
        }
        line.extend_from_slice(arg.as_ref().as_bytes());
    }
    line.extend_from_slice(b"\r\n");
    line
}

/// Reads until one complete reply is buffered and returns it.
///
/// Bytes after the reply stay in `buf` for the next call.
pub async fn read_reply<R>(stream: &mut R, buf: &mut BytesMut) -> Result<RespValue, CliError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some((value, consumed)) = parse_reply(&buf[..])? {
            let _ = buf.split_to(consumed);
            return Ok(value);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(CliError::Closed);
        }
    }
}

/// Sends one request and waits for its reply.
pub async fn send_command<S, A>(
    stream: &mut S,
    buf: &mut BytesMut,
    args: &[A],
) -> Result<RespValue, CliError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    A: AsRef<str>,
{
    stream.write_all(&encode_request(args)).await?;
    stream.flush().await?;
    read_reply(stream, buf).await
}

/// Runs the interactive loop over `input`, printing prompts and replies to
/// `output`.
///
/// Returns when `input` hits EOF, when the user types `quit` or `exit`, or
/// when the server closes the connection.
pub async fn repl<S, I, O>(
    stream: &mut S,
    input: I,
    output: &mut O,
    prompt: &str,
) -> Result<(), CliError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let args: Vec<&str> = line.split_whitespace().collect();
        if args.is_empty() {
            continue;
        }
        if args.len() == 1 && is_quit(args[0]) {
            break;
        }

        let reply = send_command(stream, &mut buf, &args[..]).await?;
        output.write_all(format!("{}\n", reply).as_bytes()).await?;
    }
    Ok(())
}

/// Connects and runs either one-shot or interactive mode.
pub async fn run(args: CliArgs) -> Result<(), CliError> {
    let addr = args.addr();
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| CliError::Connect {
            addr: addr.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;

    if args.is_interactive() {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let prompt = format!("{}> ", addr);
        repl(&mut stream, stdin, &mut stdout, &prompt).await
    } else {
        let mut buf = BytesMut::with_capacity(4096);
        let reply = send_command(&mut stream, &mut buf, &args.command[..]).await?;
        println!("{}", reply);
        Ok(())
    }
}
