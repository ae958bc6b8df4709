//! The game state segment: layout, typed views and lifecycle.
//!
//! The segment is a `#[repr(C)]` [`GameHeader`] followed by `width * height` cells of
//! `i32`, row-major. A cell holding a positive value is free and worth that many points;
//! a cell holding `v <= 0` belongs to player `-v`.
//!
//! Nothing outside this crate touches the raw mapping: state is read through a
//! [`GameView`] and written through a [`GameViewMut`], both handed out by
//! [`Arena`](crate::arena::Arena) while the matching lock is held.

use std::mem::size_of;

use tracing::instrument;

use crate::{
    error::ArenaError,
    session::SessionId,
    shm::{self, Access, SharedRegion},
};

/// Capacity of the player table.
pub const MAX_PLAYERS: usize = 9;

/// Bytes reserved for a player name, NUL padded.
pub const NAME_LEN: usize = 16;

/// One row of the shared player table.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlayerRecord {
    name: [u8; NAME_LEN],
    /// Sum of the rewards of every cell claimed by a valid move.
    pub score: u32,
    /// Moves rejected by the referee, including unknown direction bytes.
    pub invalid_moves: u32,
    /// Moves accepted by the referee.
    pub valid_moves: u32,
    /// Current column.
    pub x: u16,
    /// Current row.
    pub y: u16,
    /// Process id of the agent controlling this player.
    pub pid: libc::pid_t,
    /// Set once the agent closed its pipe; never cleared.
    pub blocked: bool,
}

impl PlayerRecord {
    /// Display name, up to the first NUL.
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Stores `name`, truncated on a char boundary so that a NUL always fits.
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(NAME_LEN - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name = [0; NAME_LEN];
        self.name[..end].copy_from_slice(&name.as_bytes()[..end]);
    }

    /// `(x, y)`.
    pub fn position(&self) -> (u16, u16) {
        (self.x, self.y)
    }
}

#[repr(C)]
pub(crate) struct GameHeader {
    width: u16,
    height: u16,
    num_players: u32,
    players: [PlayerRecord; MAX_PLAYERS],
    finished: bool,
    board: [i32; 0],
}

const HEADER_LEN: usize = size_of::<GameHeader>();

/// Byte length of the segment for a `width x height` board.
pub fn segment_len(width: u16, height: u16) -> usize {
    HEADER_LEN + usize::from(width) * usize::from(height) * size_of::<i32>()
}

/// Whether a cell value is an unclaimed reward.
pub fn is_free(value: i32) -> bool {
    value > 0
}

/// Cell value marking a cell as owned by `player`.
pub fn owner_tag(player: usize) -> i32 {
    -(player as i32)
}

/// Owner of a claimed cell, `None` for a free one.
pub fn owner_of(value: i32) -> Option<usize> {
    if is_free(value) {
        None
    } else {
        Some(value.unsigned_abs() as usize)
    }
}

/// Read-only view of a game, either live under the reader lock or over a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct GameView<'a> {
    width: u16,
    height: u16,
    finished: bool,
    players: &'a [PlayerRecord],
    board: &'a [i32],
}

impl<'a> GameView<'a> {
    fn from_header(header: &'a GameHeader, board: &'a [i32]) -> GameView<'a> {
        let num_players = (header.num_players as usize).min(MAX_PLAYERS);
        GameView {
            width: header.width,
            height: header.height,
            finished: header.finished,
            players: &header.players[..num_players],
            board,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Active players, in index order.
    pub fn players(&self) -> &'a [PlayerRecord] {
        self.players
    }

    pub fn player(&self, index: usize) -> Option<&'a PlayerRecord> {
        self.players.get(index)
    }

    /// Index of the player controlled by process `pid`.
    pub fn player_by_pid(&self, pid: libc::pid_t) -> Option<usize> {
        self.players.iter().position(|p| p.pid == pid)
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < i32::from(self.width) && y < i32::from(self.height)
    }

    /// Value of cell `(x, y)`, `None` out of bounds.
    pub fn cell(&self, x: i32, y: i32) -> Option<i32> {
        if self.in_bounds(x, y) {
            self.board.get(y as usize * usize::from(self.width) + x as usize).copied()
        } else {
            None
        }
    }

    /// Whether `(x, y)` is in bounds and free.
    pub fn is_free_cell(&self, x: i32, y: i32) -> bool {
        self.cell(x, y).is_some_and(is_free)
    }

    /// All cells, row-major.
    pub fn cells(&self) -> &'a [i32] {
        self.board
    }

    /// Owned copy of everything, for use after the lock is released.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            width: self.width,
            height: self.height,
            finished: self.finished,
            players: self.players.to_vec(),
            board: self.board.to_vec(),
        }
    }
}

/// Mutable view of a live game, only available under the writer lock.
pub struct GameViewMut<'a> {
    header: &'a mut GameHeader,
    board: &'a mut [i32],
}

impl GameViewMut<'_> {
    pub fn view(&self) -> GameView<'_> {
        GameView::from_header(self.header, self.board)
    }

    /// Sets the number of active players. Capped at [`MAX_PLAYERS`].
    pub fn set_num_players(&mut self, count: usize) {
        self.header.num_players = count.min(MAX_PLAYERS) as u32;
    }

    pub fn player_mut(&mut self, index: usize) -> Option<&mut PlayerRecord> {
        let num_players = (self.header.num_players as usize).min(MAX_PLAYERS);
        self.header.players[..num_players].get_mut(index)
    }

    /// Overwrites cell `(x, y)`. Returns the previous value, `None` out of bounds.
    pub fn set_cell(&mut self, x: i32, y: i32, value: i32) -> Option<i32> {
        if !self.view().in_bounds(x, y) {
            return None;
        }
        let index = y as usize * usize::from(self.header.width) + x as usize;
        self.board
            .get_mut(index)
            .map(|cell| std::mem::replace(cell, value))
    }

    pub fn cells_mut(&mut self) -> &mut [i32] {
        self.board
    }

    /// Sets `finished`. There is no way back.
    pub fn mark_finished(&mut self) {
        self.header.finished = true;
    }
}

/// Owned copy of a game, detached from shared memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    pub width: u16,
    pub height: u16,
    pub finished: bool,
    pub players: Vec<PlayerRecord>,
    pub board: Vec<i32>,
}

impl GameSnapshot {
    pub fn view(&self) -> GameView<'_> {
        GameView {
            width: self.width,
            height: self.height,
            finished: self.finished,
            players: &self.players,
            board: &self.board,
        }
    }
}

/// The mapped game state segment of one session.
pub struct StateSegment {
    region: SharedRegion,
    width: u16,
    height: u16,
}

impl StateSegment {
    /// Creates the zero-filled segment of `session` for a `width x height` board.
    ///
    /// # Errors
    /// [`ArenaError::Allocation`] if the name exists or the segment cannot be created,
    /// sized or mapped.
    #[instrument(skip(session), fields(session = %session))]
    pub fn allocate(
        session: &SessionId,
        width: u16,
        height: u16,
    ) -> Result<StateSegment, ArenaError> {
        let region = SharedRegion::create(&session.state_name(), segment_len(width, height))?;
        let header = region.as_ptr().cast::<GameHeader>();
        // SAFETY: the region is fresh, writable and large enough for the header.
        unsafe {
            (*header).width = width;
            (*header).height = height;
        }
        Ok(StateSegment {
            region,
            width,
            height,
        })
    }

    /// Maps the existing segment of `session` read-write.
    ///
    /// # Errors
    /// [`ArenaError::Attach`] if it is missing, cannot be mapped, or is shorter than its
    /// header announces.
    pub fn attach_read_write(session: &SessionId) -> Result<StateSegment, ArenaError> {
        Self::attach(session, Access::ReadWrite)
    }

    /// Maps the existing segment of `session` read-only.
    ///
    /// # Errors
    /// Same as [`attach_read_write`](Self::attach_read_write).
    pub fn attach_read_only(session: &SessionId) -> Result<StateSegment, ArenaError> {
        Self::attach(session, Access::ReadOnly)
    }

    #[instrument(skip(session), fields(session = %session))]
    fn attach(session: &SessionId, access: Access) -> Result<StateSegment, ArenaError> {
        let name = session.state_name();
        let region = SharedRegion::open(&name, HEADER_LEN, access)?;
        let header = region.as_ptr().cast::<GameHeader>();
        // SAFETY: at least HEADER_LEN bytes are mapped; dimensions never change after
        // allocation.
        let (width, height) = unsafe { ((*header).width, (*header).height) };
        if region.len() < segment_len(width, height) {
            return Err(ArenaError::attach(
                &name,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("segment too small for a {width}x{height} board"),
                ),
            ));
        }
        Ok(StateSegment {
            region,
            width,
            height,
        })
    }

    /// Unlinks the segment name of `session`. Idempotent, never fails.
    pub fn release(session: &SessionId) {
        shm::unlink(&session.state_name());
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.region.access() == Access::ReadWrite
    }

    fn cell_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }

    /// # Safety
    /// The caller must hold the reader or writer lock for the lifetime of the view.
    pub(crate) unsafe fn view(&self) -> GameView<'_> {
        let header = self.region.as_ptr().cast::<GameHeader>();
        let board = std::ptr::addr_of!((*header).board).cast::<i32>();
        GameView::from_header(
            &*header,
            std::slice::from_raw_parts(board, self.cell_count()),
        )
    }

    /// # Safety
    /// The caller must hold the writer lock for the lifetime of the view, and no other
    /// view of this segment may be alive in this process.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn view_mut(&self) -> GameViewMut<'_> {
        debug_assert!(self.is_writable(), "write view over a read-only mapping");
        let header = self.region.as_ptr().cast::<GameHeader>();
        let board = std::ptr::addr_of_mut!((*header).board).cast::<i32>();
        GameViewMut {
            header: &mut *header,
            board: std::slice::from_raw_parts_mut(board, self.cell_count()),
        }
    }
}
