//! Both shared segments of a session, behind the reader/writer lock.
//!
//! [`Arena`] is the orchestrator's side: it creates the segments, is the only writer and
//! removes everything at the end. [`ArenaClient`] is what agents and the view attach
//! with: a read-only state mapping and a read-write sync mapping.

use std::io;

use tracing::{info, instrument};

use crate::{
    error::ArenaError,
    session::SessionId,
    state::{GameSnapshot, GameView, GameViewMut, StateSegment},
    sync::{SyncBlock, SyncSegment},
};

/// Owner of a session's shared state.
pub struct Arena {
    session: SessionId,
    state: StateSegment,
    sync: SyncSegment,
    released: bool,
}

impl Arena {
    /// Creates both segments of `session`.
    ///
    /// # Errors
    /// [`ArenaError::Allocation`] if either segment cannot be created. A state segment
    /// created before the sync segment failed is unlinked again.
    #[instrument(skip(session), fields(session = %session))]
    pub fn allocate(session: SessionId, width: u16, height: u16) -> Result<Arena, ArenaError> {
        let state = StateSegment::allocate(&session, width, height)?;
        let sync = match SyncSegment::allocate(&session) {
            Ok(sync) => sync,
            Err(e) => {
                StateSegment::release(&session);
                return Err(e);
            }
        };
        info!("arena allocated");
        Ok(Arena {
            session,
            state,
            sync,
            released: false,
        })
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn width(&self) -> u16 {
        self.state.width()
    }

    pub fn height(&self) -> u16 {
        self.state.height()
    }

    pub fn sync(&self) -> &SyncBlock {
        &self.sync
    }

    /// Runs `f` inside the reader group.
    pub fn read<R>(&self, f: impl FnOnce(&GameView<'_>) -> R) -> io::Result<R> {
        read_locked(&self.state, &self.sync, f)
    }

    /// Runs `f` with exclusive access.
    pub fn write<R>(&self, f: impl FnOnce(&mut GameViewMut<'_>) -> R) -> io::Result<R> {
        let _guard = self.sync.writer_lock()?;
        // SAFETY: the writer lock is held until the view is gone, and `read`/`write` never
        // nest because `f` cannot reach this arena's lock without deadlocking first.
        let mut view = unsafe { self.state.view_mut() };
        Ok(f(&mut view))
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> io::Result<GameSnapshot> {
        self.read(|game| game.snapshot())
    }

    /// Destroys the semaphores and unlinks both names. Idempotent.
    ///
    /// Must only be called once no other process uses the session anymore.
    pub fn shutdown(&mut self) {
        self.sync.destroy();
        self.release();
    }

    /// Unlinks both names. Idempotent; mappings stay valid until the arena is dropped.
    pub fn release(&mut self) {
        if !self.released {
            StateSegment::release(&self.session);
            SyncSegment::release(&self.session);
            self.released = true;
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // Children may still be running after a failed setup: unlink, but leave the
        // semaphores alone.
        self.release();
    }
}

/// A process attached to someone else's arena.
pub struct ArenaClient {
    state: StateSegment,
    sync: SyncSegment,
}

impl ArenaClient {
    /// Attaches to both segments of `session`.
    ///
    /// # Errors
    /// [`ArenaError::Attach`] if either segment is missing or cannot be mapped.
    #[instrument(skip_all, fields(session = %session))]
    pub fn attach(session: &SessionId) -> Result<ArenaClient, ArenaError> {
        let state = StateSegment::attach_read_only(session)?;
        let sync = SyncSegment::attach_read_write(session)?;
        Ok(ArenaClient { state, sync })
    }

    pub fn width(&self) -> u16 {
        self.state.width()
    }

    pub fn height(&self) -> u16 {
        self.state.height()
    }

    pub fn sync(&self) -> &SyncBlock {
        &self.sync
    }

    /// Runs `f` inside the reader group.
    pub fn read<R>(&self, f: impl FnOnce(&GameView<'_>) -> R) -> io::Result<R> {
        read_locked(&self.state, &self.sync, f)
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> io::Result<GameSnapshot> {
        self.read(|game| game.snapshot())
    }
}

fn read_locked<R>(
    state: &StateSegment,
    sync: &SyncBlock,
    f: impl FnOnce(&GameView<'_>) -> R,
) -> io::Result<R> {
    let _guard = sync.reader_lock()?;
    // SAFETY: the reader lock is held until the view is gone.
    let view = unsafe { state.view() };
    Ok(f(&view))
}
