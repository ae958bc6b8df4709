//! The reference agent: waits for its permit, asks a [`MovePolicy`] and writes the move.

pub mod policy;

use std::io::{self, Write};

use anyhow::{bail, Context};
use tracing::{debug, info, instrument};

use crate::{arena::ArenaClient, protocol::Direction};

pub use policy::{FirstFree, MovePolicy, PolicyKind, Territory};

/// Why an agent stopped playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentExit {
    /// The game was over when the permit arrived.
    Finished,
    /// The policy found no free neighbour.
    NoMoves,
    /// The orchestrator closed the pipe.
    PipeClosed,
}

/// Index of the player controlled by this process.
///
/// # Errors
/// The player table has no row with this process id.
pub fn find_self(client: &ArenaClient) -> anyhow::Result<usize> {
    let pid = std::process::id() as libc::pid_t;
    let index = client.read(|game| game.player_by_pid(pid))?;
    match index {
        Some(index) => Ok(index),
        None => bail!("no player is controlled by process {pid}"),
    }
}

/// Plays as player `me` until the game ends, the policy gives up or the pipe closes.
///
/// `out` is the move pipe. Dropping it afterwards signals end of stream.
///
/// # Errors
/// A semaphore operation fails, or writing a move fails for another reason than a closed
/// pipe.
#[instrument(skip(client, policy, out))]
pub fn play<W: Write>(
    client: &ArenaClient,
    me: usize,
    policy: &mut dyn MovePolicy,
    mut out: W,
) -> anyhow::Result<AgentExit> {
    let mut moves = 0usize;
    loop {
        client.sync().wait_permit(me)?;
        let step = client.read(|game| {
            if game.is_finished() {
                Err(AgentExit::Finished)
            } else {
                policy.choose(game, me).ok_or(AgentExit::NoMoves)
            }
        })?;
        let direction: Direction = match step {
            Ok(direction) => direction,
            Err(exit) => {
                info!(moves, ?exit, "agent done");
                return Ok(exit);
            }
        };

        match out.write_all(&[direction.as_byte()]).and_then(|()| out.flush()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(moves, "move pipe closed");
                return Ok(AgentExit::PipeClosed);
            }
            Err(e) => return Err(e).context("could not send move"),
        }
        moves += 1;
    }
}
