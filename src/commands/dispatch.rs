//! Turning request lines into handler calls.

use crate::commands::CommandCtx;
use crate::connection::{Client, ClientError};
use tracing::trace;

/// Whether the session survived the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    Continue,
    /// The client asked to quit; the caller must free it.
    ClientGone,
}

/// Runs the command in `client.argv`.
pub fn process_command(client: &mut Client, ctx: &mut CommandCtx<'_>) -> Processed {
    let Some(name) = client.argv.first() else {
        return Processed::Continue;
    };

    if name.eq_ignore_ascii_case(b"quit") {
        return Processed::ClientGone;
    }

    let Some(cmd) = ctx.commands.lookup(name) else {
        let msg = format!("ERR unknown command '{}'", String::from_utf8_lossy(name));
        client.add_reply_error(msg);
        client.reset();
        return Processed::Continue;
    };

    if !cmd.arity_ok(client.argv.len()) {
        client.add_reply_error(format!(
            "ERR wrong number of arguments for '{}' command",
            cmd.name
        ));
        client.reset();
        return Processed::Continue;
    }

    trace!(client = client.id(), command = cmd.name, argc = client.argv.len(), "Dispatching");
    (cmd.proc)(client, ctx);
    ctx.stats.num_commands += 1;
    client.reset();
    Processed::Continue
}

/// Dispatches every complete line in the client's query buffer, in order.
pub fn process_input_buffer(
    client: &mut Client,
    ctx: &mut CommandCtx<'_>,
) -> Result<Processed, ClientError> {
    while !client.is_blocked() && !ctx.shutdown && client.read_command()? {
        if process_command(client, ctx) == Processed::ClientGone {
            return Ok(Processed::ClientGone);
        }
    }
    Ok(Processed::Continue)
}
