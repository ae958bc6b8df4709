//! The orchestrator: sets a game up, drives its turns and tears it down.
//!
//! [`run_game`] is the whole lifecycle in one call. It allocates the [`Arena`], seeds the
//! board, spawns one agent per player (plus the view, if any), then loops:
//!
//! 1. wait for readable agent pipes, starting from a rotating offset;
//! 2. read one byte from each ready pipe and let the [`Referee`] apply it;
//! 3. end the game on inactivity or once every agent retired;
//! 4. hand a frame to the view and sleep the frame delay.
//!
//! Once finished, every agent gets a last permit so it can see the end, pipes are
//! closed, children are reaped and the shared segments are removed.

mod board;
mod children;
mod referee;
mod settings;
mod standings;

use std::{
    fmt,
    fs::File,
    io::{self, Read},
    os::fd::AsFd,
    thread,
};

use nix::{
    errno::Errno,
    poll::{poll, PollFd, PollFlags, PollTimeout},
    unistd::Pid,
};
use tracing::{error, info, instrument, trace, warn};

use crate::{arena::Arena, error::ArenaError, session::SessionId, state::GameViewMut};

pub use board::REWARD_RANGE;
pub use children::{ChildExit, ChildRole, ExitKind};
pub use referee::{valid_target, FinishReason, MoveOutcome, Referee};
pub use settings::{GameSettings, StartCellPolicy};
pub use standings::{decide, Standings, Verdict};

/// Everything known about a game once it is over.
#[derive(Debug)]
pub struct GameReport {
    pub reason: FinishReason,
    /// Reaped children, view first when it outlived agents.
    pub exits: Vec<ChildExit>,
    pub standings: Standings,
}

impl fmt::Display for GameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for exit in &self.exits {
            writeln!(f, "{exit}")?;
        }
        write!(f, "{}", self.standings)
    }
}

/// Plays one full game of `settings` under `session`.
///
/// # Errors
/// Invalid settings, a segment that cannot be allocated, or a child that cannot be
/// spawned. Once the turn loop started the game always ends with a report.
pub fn run_game(settings: &GameSettings, session: SessionId) -> Result<GameReport, ArenaError> {
    settings.validate()?;
    let mut orchestrator = Orchestrator::setup(settings, session)?;
    let reason = orchestrator.run();
    Ok(orchestrator.teardown(reason))
}

struct AgentSlot {
    pid: Pid,
    /// `None` once the agent is blocked.
    pipe: Option<File>,
}

struct Orchestrator<'s> {
    settings: &'s GameSettings,
    arena: Arena,
    agents: Vec<AgentSlot>,
    view: Option<Pid>,
    referee: Referee,
    view_saw_finish: bool,
}

impl<'s> Orchestrator<'s> {
    #[instrument(skip_all, fields(session = %session))]
    fn setup(settings: &'s GameSettings, session: SessionId) -> Result<Self, ArenaError> {
        let arena = Arena::allocate(session, settings.width, settings.height)?;
        let players = settings.players.len();
        arena.write(|game| board::seed_board(game, players, settings.seed, settings.start_cell))?;
        info!(seed = settings.seed, players, "board seeded");

        // Pids are written before the lock is released, so an agent looking itself up
        // always finds its row.
        let (agents, view) = arena.write(|game| spawn_children(game, settings, arena.session()))??;
        for index in 0..agents.len() {
            arena.sync().grant_permit(index)?;
        }
        info!(agents = agents.len(), view = view.is_some(), "children started");

        Ok(Orchestrator {
            settings,
            arena,
            agents,
            view,
            referee: Referee::new(settings.timeout),
            view_saw_finish: false,
        })
    }

    #[instrument(skip_all)]
    fn run(&mut self) -> FinishReason {
        loop {
            match self.turn() {
                Ok(Some(reason)) => return reason,
                Ok(None) => {}
                Err(e) => {
                    error!("turn loop aborted: {e}");
                    return FinishReason::Aborted;
                }
            }
        }
    }

    fn turn(&mut self) -> Result<Option<FinishReason>, ArenaError> {
        let blocked: Vec<bool> = self.agents.iter().map(|a| a.pipe.is_none()).collect();
        let order = self.referee.poll_order(&blocked);
        for index in self.ready_agents(&order)? {
            self.service(index)?;
        }

        let reason = self.referee.check_finished(&self.arena)?;
        if self.view.is_some() {
            self.draw(reason.is_some())?;
            thread::sleep(self.settings.delay);
        }
        self.referee.advance();
        Ok(reason)
    }

    /// Agents in `order` whose pipe has something to read, in the same order.
    fn ready_agents(&self, order: &[usize]) -> Result<Vec<usize>, ArenaError> {
        if order.is_empty() {
            return Ok(Vec::new());
        }
        let mut owners = Vec::with_capacity(order.len());
        let mut fds = Vec::with_capacity(order.len());
        for &index in order {
            if let Some(pipe) = &self.agents[index].pipe {
                owners.push(index);
                fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
            }
        }

        let millis = self.referee.time_left().as_millis();
        let timeout = PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX));
        match poll(&mut fds, timeout) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Vec::new()),
            Err(e) => return Err(ArenaError::Multiplex(e.into())),
        }

        let wake = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL;
        Ok(fds
            .iter()
            .zip(owners)
            .filter(|(fd, _)| fd.revents().is_some_and(|r| r.intersects(wake)))
            .map(|(_, index)| index)
            .collect())
    }

    /// Reads exactly one byte from agent `index`.
    fn service(&mut self, index: usize) -> Result<(), ArenaError> {
        let Some(pipe) = self.agents[index].pipe.as_mut() else {
            return Ok(());
        };
        let mut byte = [0u8; 1];
        match pipe.read(&mut byte) {
            Ok(0) => self.retire(index)?,
            Ok(_) => {
                self.referee.on_byte(&self.arena, index, byte[0])?;
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {
                trace!(player = index, "partial read dropped");
            }
            Err(e) => {
                warn!(player = index, "reading the move pipe failed, retiring the agent: {e}");
                self.retire(index)?;
            }
        }
        Ok(())
    }

    fn retire(&mut self, index: usize) -> io::Result<()> {
        self.agents[index].pipe = None;
        self.referee.on_end_of_stream(&self.arena, index)
    }

    fn draw(&mut self, finished: bool) -> io::Result<()> {
        let sync = self.arena.sync();
        sync.announce_frame()?;
        sync.wait_frame_done()?;
        if finished {
            self.view_saw_finish = true;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(reason = ?reason))]
    fn teardown(mut self, reason: FinishReason) -> GameReport {
        if reason == FinishReason::Aborted {
            if let Err(e) = self.arena.write(|game| game.mark_finished()) {
                error!("could not mark the game finished: {e}");
            }
        }
        if self.view.is_some() && !self.view_saw_finish {
            if let Err(e) = self.draw(true) {
                error!("last frame failed: {e}");
            }
        }

        for index in 0..self.agents.len() {
            if let Err(e) = self.arena.sync().grant_permit(index) {
                warn!(player = index, "could not grant the final permit: {e}");
            }
        }
        let pids: Vec<Pid> = self
            .agents
            .iter_mut()
            .map(|agent| {
                agent.pipe = None;
                agent.pid
            })
            .collect();

        let exits = children::reap_children(self.view, &pids);
        let players = match self.arena.snapshot() {
            Ok(snapshot) => snapshot.players,
            Err(e) => {
                error!("could not read the final state: {e}");
                Vec::new()
            }
        };
        self.arena.shutdown();
        info!("arena removed");

        GameReport {
            reason,
            exits,
            standings: Standings::new(players),
        }
    }
}

/// Spawns every agent, recording its pid, then the view. Kills whatever already runs if
/// one of them cannot be started.
fn spawn_children(
    game: &mut GameViewMut<'_>,
    settings: &GameSettings,
    session: &SessionId,
) -> Result<(Vec<AgentSlot>, Option<Pid>), ArenaError> {
    let (width, height) = (settings.width, settings.height);
    let mut agents: Vec<AgentSlot> = Vec::with_capacity(settings.players.len());
    for (index, path) in settings.players.iter().enumerate() {
        match children::spawn_agent(path, session, width, height) {
            Ok(agent) => {
                if let Some(record) = game.player_mut(index) {
                    record.pid = agent.pid.as_raw();
                }
                agents.push(AgentSlot {
                    pid: agent.pid,
                    pipe: Some(agent.pipe),
                });
            }
            Err(e) => {
                children::kill_all(agents.iter().map(|a| a.pid));
                return Err(e);
            }
        }
    }

    let view = match &settings.view {
        Some(path) => match children::spawn_view(path, session, width, height) {
            Ok(pid) => Some(pid),
            Err(e) => {
                children::kill_all(agents.iter().map(|a| a.pid));
                return Err(e);
            }
        },
        None => None,
    };
    Ok((agents, view))
}
