//! QuillKV - a single-threaded, event-driven key-value server
//!
//! This is the entry point for the server binary. It loads the optional
//! configuration file, sets up logging and hands control to the reactor.

use quillkv::config::{Config, ConfigError};
use quillkv::server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_help() {
    println!(
        r#"
QuillKV - a single-threaded, event-driven key-value server

USAGE:
    quillkv-server [CONFIG]

ARGS:
    <CONFIG>    Path to a configuration file, or '-' to read it from stdin

OPTIONS:
    -v, --version    Print version information
        --help       Print this help message

EXAMPLES:
    quillkv-server                      # Defaults: port 6379, all interfaces
    quillkv-server /etc/quillkv.conf    # Load a configuration file
    echo "port 6380" | quillkv-server -

CONNECTING:
    $ quillkv-cli -p 6379
    127.0.0.1:6379> SET name quill
    OK
    127.0.0.1:6379> GET name
    "quill"
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
QuillKV v{} - single-threaded in-memory key-value server
──────────────────────────────────────────────────────────────
{}
"#,
        quillkv::VERSION,
        config
    );
}

/// Returns the configuration path, if any, exiting on bad usage.
fn config_path_from_args() -> Option<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => None,
        [flag] if flag == "--help" => {
            print_help();
            std::process::exit(0);
        }
        [flag] if flag == "--version" || flag == "-v" => {
            println!("QuillKV version {}", quillkv::VERSION);
            std::process::exit(0);
        }
        [path] => Some(path.clone()),
        _ => {
            eprintln!("Usage: quillkv-server [/path/to/quillkv.conf]");
            std::process::exit(1);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let path = config_path_from_args();

    let config = match &path {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e @ ConfigError::Directive { .. }) => {
                eprintln!("{}", e.report());
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("Fatal error, {}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.loglevel.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    if path.is_none() {
        warn!("no config file specified, using the default config");
    }

    print_banner(&config);

    let mut server = Server::bind(config)?;
    info!("Server started, QuillKV version {}", quillkv::VERSION);
    server.run()?;

    Ok(())
}
