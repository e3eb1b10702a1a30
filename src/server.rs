//! The server: listening socket, client registry and the reactor handlers
//! that tie sessions to the keyspace.
//!
//! ## Event Flow
//!
//! ```text
//!  listener readable ──► accept_handler ──► register client READABLE
//!
//!  client readable ──► read_query_from_client
//!                         read one chunk
//!                         dispatch every complete line
//!                         replies queued? ──► register client WRITABLE
//!
//!  client writable ──► send_reply_to_client
//!                         queue drained ──► unregister WRITABLE
//!
//!  every second ──► server_cron (keyspace stats every 5th run)
//! ```
//!
//! All of it runs on one thread. The server is the reactor's context, so
//! handlers get `&mut Server` directly and nothing is shared or locked.

use crate::commands::{process_input_buffer, CommandCtx, CommandTable, Processed};
use crate::config::Config;
use crate::connection::{Client, ReadOutcome, WriteOutcome};
use crate::reactor::{EventLoop, FileProc, Mask, ReactorError, TimerAction, TimerId, SET_SIZE};
use crate::storage::{Clock, Db, Dict, IntKey, Shared, SystemClock};
use mio::net::{TcpListener, TcpStream};
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Interval of the housekeeping timer.
pub const CRON_INTERVAL: Duration = Duration::from_millis(1000);

/// The cron logs keyspace statistics every this many runs.
const CRON_LOG_EVERY: u64 = 5;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("can't bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("event loop error: {0}")]
    Reactor(#[from] ReactorError),
}

/// Counters reported by `INFO`.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Unix ms at startup.
    pub start_time_ms: i64,
    pub num_commands: u64,
    pub num_connections: u64,
}

impl ServerStats {
    pub fn new(start_time_ms: i64) -> Self {
        Self {
            start_time_ms,
            ..Default::default()
        }
    }
}

/// A registered client: its socket and session.
struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    client: Client,
    /// Whether WRITABLE interest is registered.
    write_armed: bool,
}

pub struct Server {
    config: Config,
    listener: TcpListener,
    dbs: Vec<Db>,
    /// Keyed by file descriptor.
    clients: Dict<u64, Connection, IntKey>,
    commands: CommandTable,
    shared: Shared,
    stats: ServerStats,
    clock: Rc<dyn Clock>,
    cron_loops: u64,
    next_client_id: u64,
    shutdown: bool,
}

fn read_proc() -> FileProc<Server> {
    Rc::new(
        |el: &mut EventLoop<Server>, server: &mut Server, fd: RawFd, _: Mask| {
            server.read_query_from_client(el, fd)
        },
    )
}

fn write_proc() -> FileProc<Server> {
    Rc::new(
        |el: &mut EventLoop<Server>, server: &mut Server, fd: RawFd, _: Mask| {
            server.send_reply_to_client(el, fd)
        },
    )
}

impl Server {
    /// Binds the listening socket and allocates the databases.
    pub fn bind(config: Config) -> Result<Self, ServerError> {
        Self::with_clock(config, Rc::new(SystemClock))
    }

    /// Like [`bind`](Self::bind) with a custom time source for expiration.
    pub fn with_clock(config: Config, clock: Rc<dyn Clock>) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            dbs: (0..config.databases).map(Db::new).collect(),
            listener,
            clients: Dict::new(IntKey),
            commands: CommandTable::new(),
            shared: Shared::new(),
            stats: ServerStats::new(clock.now_ms()),
            clock,
            cron_loops: 0,
            next_client_id: 1,
            shutdown: false,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Runs the reactor until `SHUTDOWN`, then closes every client.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let mut el: EventLoop<Server> = EventLoop::new(SET_SIZE)?;
        el.create_file_event(
            self.listener.as_raw_fd(),
            Mask::READABLE,
            Rc::new(
                |el: &mut EventLoop<Server>, server: &mut Server, _: RawFd, _: Mask| {
                    server.accept_handler(el)
                },
            ),
        )?;
        el.create_time_event(
            CRON_INTERVAL,
            Box::new(
                |el: &mut EventLoop<Server>, server: &mut Server, _: TimerId| {
                    server.server_cron(el)
                },
            ),
        );

        let addr = self
            .local_addr()
            .unwrap_or_else(|_| self.config.listen_addr());
        info!(%addr, "The server is now ready to accept connections");
        el.run(self)?;

        let fds: Vec<u64> = self.clients.iter().map(|(&fd, _)| fd).collect();
        for fd in fds {
            self.free_client(&mut el, fd as RawFd);
        }
        info!("Server exit");
        Ok(())
    }

    fn accept_handler(&mut self, el: &mut EventLoop<Server>) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.accept_client(el, stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accepting client connection");
                    break;
                }
            }
        }
    }

    fn accept_client(&mut self, el: &mut EventLoop<Server>, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(client = %addr, error = %e, "Could not set TCP_NODELAY");
        }
        let fd = stream.as_raw_fd();
        let key = fd as u64;
        if self.clients.contains_key(&key) {
            warn!(client = %addr, fd, "Descriptor already registered");
            return;
        }

        if let Err(e) = el.create_file_event(fd, Mask::READABLE, read_proc()) {
            warn!(client = %addr, error = %e, "Error allocating resources for the client");
            return;
        }

        let client = Client::new(self.next_client_id, self.clock.now_ms());
        self.next_client_id += 1;
        let conn = Connection {
            stream,
            addr,
            client,
            write_armed: false,
        };
        // Absence was checked above.
        let _ = self.clients.add(key, conn);
        self.stats.num_connections += 1;
        debug!(client = %addr, fd, "Accepted client");
    }

    fn read_query_from_client(&mut self, el: &mut EventLoop<Server>, fd: RawFd) {
        let now = self.clock.now_ms();
        let key = fd as u64;
        let connected_clients = self.clients.len();
        let Some(conn) = self.clients.get_mut(&key) else {
            return;
        };

        match conn.client.read_from(&mut conn.stream, now) {
            Ok(ReadOutcome::Data(_)) => el.fire_again(fd, Mask::READABLE),
            Ok(ReadOutcome::WouldBlock) => return,
            Ok(ReadOutcome::Closed) => {
                debug!(client = %conn.addr, "Client closed connection");
                self.free_client(el, fd);
                return;
            }
            Err(e) => {
                debug!(client = %conn.addr, error = %e, "Reading from client");
                self.free_client(el, fd);
                return;
            }
        }

        let mut ctx = CommandCtx {
            dbs: &mut self.dbs,
            shared: &self.shared,
            commands: &self.commands,
            stats: &mut self.stats,
            now_ms: now,
            connected_clients,
            shutdown: false,
        };
        let result = process_input_buffer(&mut conn.client, &mut ctx);
        let shutdown = ctx.shutdown;

        let keep = match result {
            Ok(Processed::Continue) => true,
            Ok(Processed::ClientGone) => false,
            Err(e) => {
                debug!(client = %conn.addr, error = %e, "Protocol error");
                false
            }
        };

        if keep && conn.client.has_pending_replies() && !conn.write_armed {
            match el.create_file_event(fd, Mask::WRITABLE, write_proc()) {
                Ok(()) => conn.write_armed = true,
                Err(e) => {
                    warn!(client = %conn.addr, error = %e, "Registering write interest");
                    self.free_client(el, fd);
                }
            }
        } else if !keep {
            self.free_client(el, fd);
        }

        if shutdown {
            self.shutdown = true;
            el.stop();
        }
    }

    fn send_reply_to_client(&mut self, el: &mut EventLoop<Server>, fd: RawFd) {
        let now = self.clock.now_ms();
        let Some(conn) = self.clients.get_mut(&(fd as u64)) else {
            return;
        };

        match conn.client.write_to(&mut conn.stream, now) {
            Ok(WriteOutcome::Drained) => {
                conn.write_armed = false;
                if let Err(e) = el.delete_file_event(fd, Mask::WRITABLE) {
                    warn!(client = %conn.addr, error = %e, "Removing write interest");
                    self.free_client(el, fd);
                }
            }
            Ok(WriteOutcome::Capped) => el.fire_again(fd, Mask::WRITABLE),
            Ok(WriteOutcome::Blocked) => {}
            Err(e) => {
                debug!(client = %conn.addr, error = %e, "Writing to client");
                self.free_client(el, fd);
            }
        }
    }

    /// Unregisters the descriptor and drops the session, closing the socket.
    fn free_client(&mut self, el: &mut EventLoop<Server>, fd: RawFd) {
        if let Err(e) = el.delete_file_event(fd, Mask::READABLE | Mask::WRITABLE) {
            debug!(fd, error = %e, "Unregistering client");
        }
        if let Some((_, conn)) = self.clients.detach(&(fd as u64)) {
            debug!(client = %conn.addr, id = conn.client.id(), "Client disconnected");
        }
    }

    fn server_cron(&mut self, _el: &mut EventLoop<Server>) -> TimerAction {
        self.cron_loops += 1;

        if self.cron_loops % CRON_LOG_EVERY == 0 {
            for db in &self.dbs {
                let stats = db.stats();
                if stats.keys > 0 || stats.volatile > 0 {
                    debug!(
                        db = db.id(),
                        keys = stats.keys,
                        volatile = stats.volatile,
                        slots = stats.slots,
                        "Keyspace"
                    );
                }
            }
            debug!(clients = self.clients.len(), "Clients connected");
        }

        TimerAction::Again(CRON_INTERVAL)
    }

    /// Whether `SHUTDOWN` was received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }
}
