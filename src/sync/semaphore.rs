use std::{cell::UnsafeCell, io};

/// A POSIX unnamed semaphore meant to live inside shared memory.
///
/// Only ever reached through a reference into a mapped [`SyncBlock`](super::SyncBlock);
/// it is initialized in place with `pshared = 1` so waiters in other processes see posts.
#[repr(transparent)]
pub struct Semaphore(UnsafeCell<libc::sem_t>);

// SAFETY: sem_* calls are the synchronization; the cell is never read as plain data.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub(crate) fn init(&self, value: u32) -> io::Result<()> {
        // SAFETY: the pointer targets writable shared memory owned by the sync segment.
        check(unsafe { libc::sem_init(self.0.get(), 1, value) })
    }

    /// Blocks until the semaphore can be decremented. Retries on `EINTR`.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            // SAFETY: initialized by `init` before any process can reach it.
            match check(unsafe { libc::sem_wait(self.0.get()) }) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    /// Decrements without blocking. Returns whether it succeeded.
    pub fn try_wait(&self) -> io::Result<bool> {
        loop {
            // SAFETY: see `wait`.
            match check(unsafe { libc::sem_trywait(self.0.get()) }) {
                Ok(()) => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn post(&self) -> io::Result<()> {
        // SAFETY: see `wait`.
        check(unsafe { libc::sem_post(self.0.get()) })
    }

    /// Current value. Racy by nature, only meaningful when nobody else is touching it.
    pub fn value(&self) -> io::Result<i32> {
        let mut value = 0;
        // SAFETY: see `wait`.
        check(unsafe { libc::sem_getvalue(self.0.get(), &mut value) })?;
        Ok(value)
    }

    pub(crate) fn destroy(&self) -> io::Result<()> {
        // SAFETY: callers guarantee no process waits on it anymore.
        check(unsafe { libc::sem_destroy(self.0.get()) })
    }
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
