//! Server configuration.
//!
//! The file format is one directive per line, arguments separated by
//! whitespace. Blank lines and lines starting with `#` are ignored:
//!
//! ```text
//! # quillkv.conf
//! port 6380
//! bind 127.0.0.1
//! timeout 300
//! databases 16
//! loglevel notice
//! ```
//!
//! Any error is fatal. [`ConfigError::Directive`] carries the line number
//! and text so the binary can print a precise diagnostic.

use std::fmt;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use thiserror::Error;

use crate::DEFAULT_PORT;

pub const DEFAULT_MAX_IDLE_SECS: u64 = 300;
pub const DEFAULT_DBNUM: usize = 16;

/// Verbosity names accepted by `loglevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    Verbose,
    #[default]
    Notice,
    Warning,
}

impl LogLevel {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "verbose" => Some(LogLevel::Verbose),
            "notice" => Some(LogLevel::Notice),
            "warning" => Some(LogLevel::Warning),
            _ => None,
        }
    }

    /// The `tracing` filter directive for this level.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "trace",
            LogLevel::Verbose => "debug",
            LogLevel::Notice => "info",
            LogLevel::Warning => "warn",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't open config file '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A line that could not be applied.
    #[error("at line {line}: {reason}")]
    Directive {
        line: usize,
        text: String,
        reason: String,
    },
}

impl ConfigError {
    /// Multi-line diagnostic printed before the process exits.
    pub fn report(&self) -> String {
        match self {
            ConfigError::Directive { line, text, reason } => format!(
                "\n*** FATAL CONFIG FILE ERROR ***\n\
                 Reading the configuration file, at line {}\n\
                 >>> '{}'\n\
                 {}",
                line, text, reason
            ),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: IpAddr,
    /// Idle seconds before a client may be dropped. Zero disables it.
    pub max_idle_secs: u64,
    pub databases: usize,
    pub loglevel: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_idle_secs: DEFAULT_MAX_IDLE_SECS,
            databases: DEFAULT_DBNUM,
            loglevel: LogLevel::Notice,
        }
    }
}

impl Config {
    /// Loads a configuration file. `-` reads it from standard input.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let open_err = |source| ConfigError::Open {
            path: path.display().to_string(),
            source,
        };

        let mut text = String::new();
        if path == Path::new("-") {
            std::io::stdin().read_to_string(&mut text).map_err(open_err)?;
        } else {
            text = std::fs::read_to_string(path).map_err(open_err)?;
        }
        Self::parse(&text)
    }

    /// Applies every directive in `text` on top of the defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let argv: Vec<&str> = line.split_whitespace().collect();
            config
                .apply(&argv)
                .map_err(|reason| ConfigError::Directive {
                    line: idx + 1,
                    text: raw.to_string(),
                    reason,
                })?;
        }
        Ok(config)
    }

    fn apply(&mut self, argv: &[&str]) -> Result<(), String> {
        let name = argv[0].to_ascii_lowercase();
        match (name.as_str(), argv.len()) {
            ("timeout", 2) => {
                self.max_idle_secs = argv[1]
                    .parse()
                    .map_err(|_| "Invalid timeout value".to_string())?;
            }
            ("port", 2) => {
                self.port = match argv[1].parse::<u16>() {
                    Ok(p) if p >= 1 => p,
                    _ => return Err("Invalid port".to_string()),
                };
            }
            ("bind", 2) => {
                self.bind = argv[1]
                    .parse()
                    .map_err(|_| "Invalid bind address".to_string())?;
            }
            ("databases", 2) => {
                self.databases = match argv[1].parse::<usize>() {
                    Ok(n) if n >= 1 => n,
                    _ => return Err("Invalid number of databases".to_string()),
                };
            }
            ("loglevel", 2) => {
                self.loglevel = LogLevel::from_str(argv[1]).ok_or_else(|| {
                    "Invalid log level. Must be one of debug, notice, warning".to_string()
                })?;
            }
            _ => return Err("Bad directive or wrong number of arguments".to_string()),
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bind={} port={} timeout={}s databases={} loglevel={:?}",
            self.bind, self.port, self.max_idle_secs, self.databases, self.loglevel
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.port, 6379);
        assert_eq!(c.listen_addr().to_string(), "0.0.0.0:6379");
        assert_eq!(c.max_idle_secs, 300);
        assert_eq!(c.databases, 16);
        assert_eq!(c.loglevel, LogLevel::Notice);
    }

    #[test]
    fn test_parse_directives() {
        let c = Config::parse(
            "# comment\n\
             \n\
             port 7000\n\
             BIND 127.0.0.1\n\
             timeout 0\n\
             databases 4\n\
             loglevel verbose\n",
        )
        .unwrap();
        assert_eq!(c.listen_addr().to_string(), "127.0.0.1:7000");
        assert_eq!(c.max_idle_secs, 0);
        assert_eq!(c.databases, 4);
        assert_eq!(c.loglevel.as_filter(), "debug");
    }

    #[test]
    fn test_bad_port_reports_line() {
        let err = Config::parse("timeout 10\nport 70000\n").unwrap_err();
        match &err {
            ConfigError::Directive { line, text, reason } => {
                assert_eq!(*line, 2);
                assert_eq!(text, "port 70000");
                assert_eq!(reason, "Invalid port");
            }
            other => panic!("unexpected error: {other}"),
        }
        let report = err.report();
        assert!(report.contains("*** FATAL CONFIG FILE ERROR ***"));
        assert!(report.contains("at line 2"));
        assert!(report.contains(">>> 'port 70000'"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::parse("port 0").is_err());
        assert!(Config::parse("timeout -1").is_err());
        assert!(Config::parse("bind nowhere").is_err());
        assert!(Config::parse("databases 0").is_err());
        assert!(Config::parse("loglevel loud").is_err());
    }

    #[test]
    fn test_rejects_unknown_directive_and_arity() {
        assert!(matches!(
            Config::parse("maxmemory 10"),
            Err(ConfigError::Directive { line: 1, .. })
        ));
        assert!(Config::parse("port").is_err());
        assert!(Config::parse("port 1 2").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/quillkv.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Open { .. }));
    }
}
