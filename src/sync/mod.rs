//! The synchronization segment.
//!
//! One [`SyncBlock`] per session holds a fair reader/writer lock built from three
//! semaphores and a reader counter, the two-semaphore draw handshake between the
//! orchestrator and the view, and one "permit to decide the next move" semaphore per
//! agent slot.
//!
//! # Lock protocol
//!
//! - Readers pass the queue gate, then join the reader group under the count gate. The
//!   first reader of a group takes the exclusive gate on the group's behalf, the last one
//!   out gives it back.
//! - Writers take the queue gate and then the exclusive gate, and release them in the
//!   opposite order.
//!
//! A writer waiting on the exclusive gate still holds the queue gate, so readers arriving
//! after it queue up behind it: the writer cannot be starved by a stream of readers.
//! Readers never block each other.

mod semaphore;

use std::{cell::UnsafeCell, io, mem::size_of, ops::Deref};

use tracing::{error, instrument, trace};

pub use semaphore::Semaphore;

use crate::{
    error::ArenaError,
    session::SessionId,
    shm::{self, Access, SharedRegion},
    state::MAX_PLAYERS,
};

/// Shared synchronization state of one game.
#[repr(C)]
pub struct SyncBlock {
    frame_ready: Semaphore,
    frame_done: Semaphore,
    queue_gate: Semaphore,
    exclusive_gate: Semaphore,
    count_gate: Semaphore,
    reader_count: UnsafeCell<u32>,
    permits: [Semaphore; MAX_PLAYERS],
}

// SAFETY: `reader_count` is only accessed while holding `count_gate`; everything else is
// a semaphore.
unsafe impl Sync for SyncBlock {}

impl SyncBlock {
    fn init(&self) -> io::Result<()> {
        self.frame_ready.init(0)?;
        self.frame_done.init(0)?;
        self.queue_gate.init(1)?;
        self.exclusive_gate.init(1)?;
        self.count_gate.init(1)?;
        // SAFETY: nobody else can reach the block before allocation returns.
        unsafe { *self.reader_count.get() = 0 };
        for permit in &self.permits {
            permit.init(0)?;
        }
        Ok(())
    }

    /// Joins the reader group. The returned guard leaves it on drop.
    pub fn reader_lock(&self) -> io::Result<ReadGuard<'_>> {
        self.queue_gate.wait()?;
        let entered = self.enter_reader_group();
        let released = self.queue_gate.post();
        entered?;
        if let Err(e) = released {
            self.reader_unlock()?;
            return Err(e);
        }
        Ok(ReadGuard { sync: self })
    }

    fn enter_reader_group(&self) -> io::Result<()> {
        self.count_gate.wait()?;
        // SAFETY: count_gate is held.
        let count = unsafe { &mut *self.reader_count.get() };
        let result = if *count == 0 {
            self.exclusive_gate.wait()
        } else {
            Ok(())
        };
        if result.is_ok() {
            *count += 1;
        }
        self.count_gate.post()?;
        result
    }

    fn reader_unlock(&self) -> io::Result<()> {
        self.count_gate.wait()?;
        // SAFETY: count_gate is held.
        let count = unsafe { &mut *self.reader_count.get() };
        debug_assert!(*count > 0, "reader_unlock without reader_lock");
        *count = count.saturating_sub(1);
        let result = if *count == 0 {
            self.exclusive_gate.post()
        } else {
            Ok(())
        };
        self.count_gate.post()?;
        result
    }

    /// Takes exclusive access. The returned guard releases it on drop.
    pub fn writer_lock(&self) -> io::Result<WriteGuard<'_>> {
        self.queue_gate.wait()?;
        if let Err(e) = self.exclusive_gate.wait() {
            let _ = self.queue_gate.post();
            return Err(e);
        }
        Ok(WriteGuard { sync: self })
    }

    fn writer_unlock(&self) -> io::Result<()> {
        self.exclusive_gate.post()?;
        self.queue_gate.post()
    }

    /// Number of processes currently inside the reader group.
    pub fn reader_count(&self) -> io::Result<u32> {
        self.count_gate.wait()?;
        // SAFETY: count_gate is held.
        let count = unsafe { *self.reader_count.get() };
        self.count_gate.post()?;
        Ok(count)
    }

    /// Orchestrator side of the handshake: a new frame can be drawn.
    pub fn announce_frame(&self) -> io::Result<()> {
        self.frame_ready.post()
    }

    /// View side: blocks until a frame is announced.
    pub fn wait_frame(&self) -> io::Result<()> {
        self.frame_ready.wait()
    }

    /// View side: the announced frame has been drawn.
    pub fn finish_frame(&self) -> io::Result<()> {
        self.frame_done.post()
    }

    /// Orchestrator side: blocks until the view is done with the frame.
    pub fn wait_frame_done(&self) -> io::Result<()> {
        self.frame_done.wait()
    }

    /// Lets `player` compute and send one more move.
    pub fn grant_permit(&self, player: usize) -> io::Result<()> {
        self.permit(player)?.post()
    }

    /// Agent side: blocks until the orchestrator grants the next move.
    pub fn wait_permit(&self, player: usize) -> io::Result<()> {
        self.permit(player)?.wait()
    }

    /// The permit semaphore of `player`.
    pub fn permit(&self, player: usize) -> io::Result<&Semaphore> {
        self.permits.get(player).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no permit for player {player}, capacity is {MAX_PLAYERS}"),
            )
        })
    }

    fn all_semaphores(&self) -> impl Iterator<Item = &Semaphore> {
        [
            &self.frame_ready,
            &self.frame_done,
            &self.queue_gate,
            &self.exclusive_gate,
            &self.count_gate,
        ]
        .into_iter()
        .chain(self.permits.iter())
    }
}

/// Membership in the reader group.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    sync: &'a SyncBlock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sync.reader_unlock() {
            error!("reader_unlock failed: {e}");
        }
    }
}

/// Exclusive access to shared state.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    sync: &'a SyncBlock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sync.writer_unlock() {
            error!("writer_unlock failed: {e}");
        }
    }
}

/// The mapped synchronization segment of one session.
pub struct SyncSegment {
    region: SharedRegion,
    destroyed: bool,
}

impl SyncSegment {
    /// Creates the segment of `session` and initializes every semaphore.
    ///
    /// # Errors
    /// [`ArenaError::Allocation`] if the name exists or the segment cannot be created,
    /// sized, mapped or initialized.
    #[instrument(skip_all, fields(session = %session))]
    pub fn allocate(session: &SessionId) -> Result<SyncSegment, ArenaError> {
        let name = session.sync_name();
        let region = SharedRegion::create(&name, size_of::<SyncBlock>())?;
        let segment = SyncSegment {
            region,
            destroyed: false,
        };
        if let Err(e) = segment.init() {
            shm::unlink(&name);
            return Err(ArenaError::allocation(&name, e));
        }
        trace!("sync segment ready");
        Ok(segment)
    }

    /// Maps the existing segment of `session` read-write.
    ///
    /// # Errors
    /// [`ArenaError::Attach`] if the segment is missing, too small or cannot be mapped.
    #[instrument(skip_all, fields(session = %session))]
    pub fn attach_read_write(session: &SessionId) -> Result<SyncSegment, ArenaError> {
        let region = SharedRegion::open(
            &session.sync_name(),
            size_of::<SyncBlock>(),
            Access::ReadWrite,
        )?;
        Ok(SyncSegment {
            region,
            destroyed: false,
        })
    }

    /// Unlinks the segment name of `session`. Idempotent, never fails.
    pub fn release(session: &SessionId) {
        shm::unlink(&session.sync_name());
    }

    /// Destroys every semaphore of the block. Idempotent.
    ///
    /// No process may use the lock, the handshake or a permit afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for semaphore in self.all_semaphores() {
            if let Err(e) = semaphore.destroy() {
                error!("sem_destroy failed: {e}");
            }
        }
        self.destroyed = true;
    }
}

impl Deref for SyncSegment {
    type Target = SyncBlock;

    fn deref(&self) -> &SyncBlock {
        // SAFETY: the region is at least `size_of::<SyncBlock>()` bytes, page aligned, and
        // was initialized by the allocating process.
        unsafe { &*self.region.as_ptr().cast::<SyncBlock>() }
    }
}
