//! Command Implementations
//!
//! Every handler receives the session (argument vector already validated
//! against the command's arity) and the server state it may touch. Replies
//! are queued on the session, never returned.
//!
//! ## Supported Commands
//!
//! ### Keys and strings
//! - `GET key` - bulk value or null bulk
//! - `SET key value` - overwrite, dropping any expiration
//! - `SETNX key value` - insert only if absent (`:1` / `:0`)
//! - `DEL key [key ...]` - number of keys removed
//! - `EXISTS key` - `:1` / `:0`
//!
//! ### Expiration
//! - `EXPIRE key seconds` / `EXPIREAT key unix-seconds`
//! - `TTL key` - seconds left, or `-1`
//! - `PERSIST key` - drop the expiration
//!
//! ### Server
//! - `PING`, `ECHO message`
//! - `SELECT index`, `DBSIZE`, `FLUSHDB`
//! - `INFO`, `SHUTDOWN`
//!
//! Every key lookup applies lazy expiration first, so an expired key is
//! deleted before any handler can observe it.

use crate::commands::CommandCtx;
use crate::connection::Client;
use crate::storage::{Db, Object};
use bytes::Bytes;
use tracing::{info, warn};

/// Parses a decimal argument the way numeric commands expect.
fn parse_i64(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

/// The database currently selected by `client`.
#[inline]
fn selected<'a>(client: &Client, ctx: &'a mut CommandCtx<'_>) -> &'a mut Db {
    &mut ctx.dbs[client.db]
}

// ============================================================================
// Keys and strings
// ============================================================================

/// GET key
pub fn get_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let now = ctx.now_ms;
    match selected(client, ctx).lookup_read(&client.argv[1], now) {
        Some(value) => client.add_reply_bulk(&value, ctx.shared),
        None => client.add_reply(&ctx.shared.nullbulk),
    }
}

/// SET key value
pub fn set_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let key = client.argv[1].clone();
    let value = Object::try_encode(Object::string(client.argv[2].clone()));
    selected(client, ctx).set(key, value);
    client.add_reply(&ctx.shared.ok);
}

/// SETNX key value
pub fn setnx_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let now = ctx.now_ms;
    let key = client.argv[1].clone();
    let value = Object::try_encode(Object::string(client.argv[2].clone()));
    let db = selected(client, ctx);
    db.expire_if_needed(&key, now);
    let reply = if db.add(key, value) {
        &ctx.shared.cone
    } else {
        &ctx.shared.czero
    };
    client.add_reply(reply);
}

/// DEL key [key ...]
pub fn del_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let now = ctx.now_ms;
    let db = &mut ctx.dbs[client.db];
    let mut deleted = 0;
    for key in &client.argv[1..] {
        db.expire_if_needed(key, now);
        if db.delete(key) {
            deleted += 1;
        }
    }
    client.add_reply_integer(deleted, ctx.shared);
}

/// EXISTS key
pub fn exists_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let now = ctx.now_ms;
    let db = selected(client, ctx);
    db.expire_if_needed(&client.argv[1], now);
    let found = db.exists(&client.argv[1]);
    client.add_reply(if found {
        &ctx.shared.cone
    } else {
        &ctx.shared.czero
    });
}

// ============================================================================
// Expiration
// ============================================================================

/// Attaches the absolute expiry `when_ms` to the key in `argv[1]`.
///
/// A time that is not in the future deletes the key on the spot. A key that
/// already carries an expiration keeps it and the reply is `:0`.
fn expire_generic(client: &mut Client, ctx: &mut CommandCtx<'_>, when_ms: i64) {
    let now = ctx.now_ms;
    let key = client.argv[1].clone();
    let db = selected(client, ctx);

    if db.lookup_write(&key, now).is_none() {
        client.add_reply(&ctx.shared.czero);
        return;
    }

    if when_ms <= now {
        db.delete(&key);
        client.add_reply(&ctx.shared.cone);
        return;
    }

    let reply = if db.set_expire(key, when_ms) {
        &ctx.shared.cone
    } else {
        &ctx.shared.czero
    };
    client.add_reply(reply);
}

/// EXPIRE key seconds
pub fn expire_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    match parse_i64(&client.argv[2]) {
        Some(seconds) => {
            let when = ctx.now_ms.saturating_add(seconds.saturating_mul(1000));
            expire_generic(client, ctx, when);
        }
        None => client.add_reply(&ctx.shared.notinterr),
    }
}

/// EXPIREAT key unix-time-seconds
pub fn expireat_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    match parse_i64(&client.argv[2]) {
        Some(at) => expire_generic(client, ctx, at.saturating_mul(1000)),
        None => client.add_reply(&ctx.shared.notinterr),
    }
}

/// TTL key
///
/// Remaining lifetime in whole seconds, rounded up; `-1` if the key has no
/// expiration or does not exist.
pub fn ttl_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let now = ctx.now_ms;
    let db = selected(client, ctx);
    db.expire_if_needed(&client.argv[1], now);

    let ttl = match db.get_expire(&client.argv[1]) {
        Some(when) => (when - now + 999) / 1000,
        None => -1,
    };
    client.add_reply_integer(ttl, ctx.shared);
}

/// PERSIST key
pub fn persist_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let now = ctx.now_ms;
    let db = selected(client, ctx);
    let removed = db.lookup_write(&client.argv[1], now).is_some() && db.remove_expire(&client.argv[1]);
    client.add_reply(if removed {
        &ctx.shared.cone
    } else {
        &ctx.shared.czero
    });
}

// ============================================================================
// Server
// ============================================================================

/// PING
pub fn ping_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    client.add_reply(&ctx.shared.pong);
}

/// ECHO message
pub fn echo_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let msg = Object::string(client.argv[1].clone());
    client.add_reply_bulk(&msg, ctx.shared);
}

/// SELECT index
pub fn select_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    match parse_i64(&client.argv[1]) {
        Some(id) if id >= 0 && (id as usize) < ctx.dbs.len() => {
            client.db = id as usize;
            client.add_reply(&ctx.shared.ok);
        }
        _ => client.add_reply_error("ERR invalid DB index"),
    }
}

/// DBSIZE
pub fn dbsize_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let size = selected(client, ctx).len() as i64;
    client.add_reply_integer(size, ctx.shared);
}

/// FLUSHDB
pub fn flushdb_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let db = selected(client, ctx);
    let removed = db.flush();
    info!(db = db.id(), keys = removed, "Flushed database");
    client.add_reply(&ctx.shared.ok);
}

/// INFO
pub fn info_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    let uptime = (ctx.now_ms - ctx.stats.start_time_ms).max(0) / 1000;

    let mut info = format!(
        "quillkv_version:{}\r\n\
         uptime_in_seconds:{}\r\n\
         uptime_in_days:{}\r\n\
         connected_clients:{}\r\n\
         total_connections_received:{}\r\n\
         total_commands_processed:{}\r\n",
        crate::VERSION,
        uptime,
        uptime / 86_400,
        ctx.connected_clients,
        ctx.stats.num_connections,
        ctx.stats.num_commands,
    );
    for db in ctx.dbs.iter().filter(|db| !db.is_empty()) {
        let stats = db.stats();
        info.push_str(&format!(
            "db{}:keys={},expires={}\r\n",
            db.id(),
            stats.keys,
            stats.volatile
        ));
    }

    client.add_reply_bulk(&Object::string(info), ctx.shared);
}

/// SHUTDOWN
///
/// Stops the server once the current read event is done. No reply is sent.
pub fn shutdown_command(client: &mut Client, ctx: &mut CommandCtx<'_>) {
    warn!(client = client.id(), "User requested shutdown");
    ctx.shutdown = true;
}

#[cfg(test)]
mod tests {
    use crate::commands::testing::Harness;

    #[test]
    fn test_ping() {
        let mut h = Harness::new();
        assert_eq!(h.run("PING"), b"+PONG\r\n");
    }

    #[test]
    fn test_set_get() {
        let mut h = Harness::new();
        assert_eq!(h.run("SET name quill"), b"+OK\r\n");
        assert_eq!(h.run("GET name"), b"$5\r\nquill\r\n");
    }

    #[test]
    fn test_get_nonexistent() {
        let mut h = Harness::new();
        assert_eq!(h.run("GET nonexistent"), b"$-1\r\n");
    }

    #[test]
    fn test_set_overwrites_and_clears_ttl() {
        let mut h = Harness::new();
        h.run("SET k v1");
        assert_eq!(h.run("EXPIRE k 100"), b":1\r\n");
        assert_eq!(h.run("SET k v2"), b"+OK\r\n");
        assert_eq!(h.run("GET k"), b"$2\r\nv2\r\n");
        assert_eq!(h.run("TTL k"), b":-1\r\n");
    }

    #[test]
    fn test_integer_values_round_trip() {
        let mut h = Harness::new();
        h.run("SET n 12345");
        h.run("SET z 007");
        assert_eq!(h.run("GET n"), b"$5\r\n12345\r\n");
        assert_eq!(h.run("GET z"), b"$3\r\n007\r\n");
    }

    #[test]
    fn test_setnx() {
        let mut h = Harness::new();
        assert_eq!(h.run("SETNX k v1"), b":1\r\n");
        assert_eq!(h.run("SETNX k v2"), b":0\r\n");
        assert_eq!(h.run("GET k"), b"$2\r\nv1\r\n");
    }

    #[test]
    fn test_del_counts_removed() {
        let mut h = Harness::new();
        h.run("SET a 1");
        h.run("SET c 3");
        assert_eq!(h.run("DEL a b c"), b":2\r\n");
        assert_eq!(h.run("EXISTS a"), b":0\r\n");
    }

    #[test]
    fn test_exists() {
        let mut h = Harness::new();
        assert_eq!(h.run("EXISTS k"), b":0\r\n");
        h.run("SET k v");
        assert_eq!(h.run("EXISTS k"), b":1\r\n");
    }

    #[test]
    fn test_negative_expire_deletes() {
        let mut h = Harness::new();
        h.run("SET k v");
        assert_eq!(h.run("EXPIRE k -1"), b":1\r\n");
        assert_eq!(h.run("GET k"), b"$-1\r\n");
        assert_eq!(h.run("EXISTS k"), b":0\r\n");
    }

    #[test]
    fn test_expire_missing_key_and_existing_ttl() {
        let mut h = Harness::new();
        assert_eq!(h.run("EXPIRE nope 10"), b":0\r\n");
        h.run("SET k v");
        assert_eq!(h.run("EXPIRE k 10"), b":1\r\n");
        assert_eq!(h.run("EXPIRE k 20"), b":0\r\n");
        assert_eq!(h.run("TTL k"), b":10\r\n");
    }

    #[test]
    fn test_expire_not_an_integer() {
        let mut h = Harness::new();
        h.run("SET k v");
        assert_eq!(
            h.run("EXPIRE k soon"),
            b"-ERR value is not an integer or out of range\r\n"
        );
    }

    #[test]
    fn test_ttl_with_simulated_clock() {
        let mut h = Harness::new();
        h.run("SET k v");
        assert_eq!(h.run("TTL k"), b":-1\r\n");

        h.run("EXPIRE k 10");
        h.now_ms += 2_500;
        assert_eq!(h.run("TTL k"), b":8\r\n");

        h.now_ms += 7_501;
        assert_eq!(h.run("TTL k"), b":-1\r\n");
        assert_eq!(h.run("EXISTS k"), b":0\r\n");
    }

    #[test]
    fn test_expireat() {
        let mut h = Harness::new();
        h.run("SET k v");
        let at = h.now_ms / 1000 + 60;
        assert_eq!(h.run(&format!("EXPIREAT k {}", at)), b":1\r\n");
        h.now_ms = at * 1000 + 1;
        assert_eq!(h.run("GET k"), b"$-1\r\n");

        h.run("SET j v");
        assert_eq!(h.run("EXPIREAT j 1"), b":1\r\n");
        assert_eq!(h.run("EXISTS j"), b":0\r\n");
    }

    #[test]
    fn test_persist() {
        let mut h = Harness::new();
        h.run("SET k v");
        assert_eq!(h.run("PERSIST k"), b":0\r\n");
        h.run("EXPIRE k 10");
        assert_eq!(h.run("PERSIST k"), b":1\r\n");
        assert_eq!(h.run("TTL k"), b":-1\r\n");
        assert_eq!(h.run("EXPIRE k 20"), b":1\r\n");
    }

    #[test]
    fn test_echo() {
        let mut h = Harness::new();
        assert_eq!(h.run("ECHO hello"), b"$5\r\nhello\r\n");
    }

    #[test]
    fn test_select_isolates_databases() {
        let mut h = Harness::new();
        h.run("SET k v");
        assert_eq!(h.run("SELECT 1"), b"+OK\r\n");
        assert_eq!(h.run("GET k"), b"$-1\r\n");
        assert_eq!(h.run("DBSIZE"), b":0\r\n");
        assert_eq!(h.run("SELECT 16"), b"-ERR invalid DB index\r\n");
        assert_eq!(h.run("SELECT x"), b"-ERR invalid DB index\r\n");
        assert_eq!(h.run("SELECT 0"), b"+OK\r\n");
        assert_eq!(h.run("DBSIZE"), b":1\r\n");
    }

    #[test]
    fn test_dbsize_and_flushdb() {
        let mut h = Harness::new();
        h.run("SET a 1");
        h.run("SET b 2");
        h.run("EXPIRE b 10");
        assert_eq!(h.run("DBSIZE"), b":2\r\n");
        assert_eq!(h.run("FLUSHDB"), b"+OK\r\n");
        assert_eq!(h.run("DBSIZE"), b":0\r\n");
        assert_eq!(h.dbs[0].stats().volatile, 0);
    }

    #[test]
    fn test_info() {
        let mut h = Harness::new();
        h.run("SET a 1");
        h.run("EXPIRE a 10");
        let out = String::from_utf8(h.run("INFO")).unwrap();
        assert!(out.starts_with('$'));
        assert!(out.contains("quillkv_version:"));
        assert!(out.contains("total_commands_processed:2\r\n"));
        assert!(out.contains("db0:keys=1,expires=1\r\n"));
        assert!(!out.contains("db1:"));
    }

    #[test]
    fn test_shutdown_sets_flag_without_reply() {
        let mut h = Harness::new();
        assert!(h.run("SHUTDOWN").is_empty());
        assert!(h.shutdown);
    }
}
