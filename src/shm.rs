//! POSIX shared-memory regions.
//!
//! A [`SharedRegion`] is one `shm_open` object mapped `MAP_SHARED` into this process.
//! The mapping is removed when the value is dropped; the name lives on until
//! [`unlink`] is called, so other processes keep their own mappings either way.

use std::{ffi::c_void, fs::File, io, num::NonZeroUsize, ptr::NonNull};

use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::{
        mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags},
        stat::Mode,
    },
    unistd::ftruncate,
};
use tracing::{debug, trace, warn};

use crate::error::ArenaError;

/// How a region is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    fn open_flags(self) -> OFlag {
        match self {
            Access::ReadOnly => OFlag::O_RDONLY,
            Access::ReadWrite => OFlag::O_RDWR,
        }
    }

    fn prot(self) -> ProtFlags {
        match self {
            Access::ReadOnly => ProtFlags::PROT_READ,
            Access::ReadWrite => ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SharedRegion {
    ptr: NonNull<c_void>,
    len: usize,
    access: Access,
}

impl SharedRegion {
    /// Creates `name` with `len` zeroed bytes and maps it read-write.
    ///
    /// Fails if the name already exists. On a sizing or mapping failure the freshly
    /// created name is unlinked again.
    pub(crate) fn create(name: &str, len: usize) -> Result<SharedRegion, ArenaError> {
        let fd = shm_open(
            name,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o666),
        )
        .map_err(|e| ArenaError::allocation(name, e))?;
        let file = File::from(fd);

        let mapped = off_t(len)
            .and_then(|size| ftruncate(&file, size).map_err(io::Error::from))
            .and_then(|()| map(&file, len, Access::ReadWrite));
        let region = match mapped {
            Ok(region) => region,
            Err(e) => {
                unlink(name);
                return Err(ArenaError::allocation(name, e));
            }
        };

        // SAFETY: the mapping is `len` bytes long and writable.
        unsafe { region.ptr.as_ptr().write_bytes(0, len) };
        trace!(name, len, "shared region created");
        Ok(region)
    }

    /// Opens an existing `name` and maps all of it.
    ///
    /// Fails if the object is missing, cannot be mapped, or is shorter than `min_len`.
    pub(crate) fn open(
        name: &str,
        min_len: usize,
        access: Access,
    ) -> Result<SharedRegion, ArenaError> {
        let fd = shm_open(name, access.open_flags(), Mode::empty())
            .map_err(|e| ArenaError::attach(name, e))?;
        let file = File::from(fd);

        let len = file
            .metadata()
            .map_err(|e| ArenaError::attach(name, e))?
            .len();
        let len = usize::try_from(len).map_err(|_| {
            ArenaError::attach(name, io::Error::from(io::ErrorKind::InvalidData))
        })?;
        if len < min_len {
            return Err(ArenaError::attach(
                name,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("segment is {len} bytes, expected at least {min_len}"),
                ),
            ));
        }

        let region = map(&file, len, access).map_err(|e| ArenaError::attach(name, e))?;
        trace!(name, len, ?access, "shared region attached");
        Ok(region)
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr().cast()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn access(&self) -> Access {
        self.access
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` come from a successful mmap and nothing borrows the region
        // once its owner is dropped.
        if let Err(e) = unsafe { munmap(self.ptr, self.len) } {
            warn!("munmap failed: {e}");
        }
    }
}

/// Removes `name`. Missing names are fine; other failures are logged and swallowed.
pub(crate) fn unlink(name: &str) {
    match shm_unlink(name) {
        Ok(()) => trace!(name, "shared region unlinked"),
        Err(Errno::ENOENT) => debug!(name, "shared region already unlinked"),
        Err(e) => warn!(name, "shm_unlink failed: {e}"),
    }
}

fn off_t(len: usize) -> io::Result<libc::off_t> {
    libc::off_t::try_from(len).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
}

fn map(file: &File, len: usize, access: Access) -> io::Result<SharedRegion> {
    let length = NonZeroUsize::new(len).ok_or(io::ErrorKind::InvalidInput)?;
    // SAFETY: a fresh shared mapping at an address chosen by the kernel aliases no Rust
    // object.
    let ptr = unsafe { mmap(None, length, access.prot(), MapFlags::MAP_SHARED, file, 0) }?;
    Ok(SharedRegion { ptr, len, access })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn unique_name() -> String {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        format!(
            "/chomp.shm-test-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn created_region_is_zeroed_and_shared() {
        let name = unique_name();
        let region = SharedRegion::create(&name, 64).unwrap();
        assert_eq!(region.len(), 64);
        let bytes = unsafe { std::slice::from_raw_parts(region.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));

        unsafe { region.as_ptr().add(3).write(42) };
        let other = SharedRegion::open(&name, 64, Access::ReadOnly).unwrap();
        assert_eq!(other.access(), Access::ReadOnly);
        assert_eq!(unsafe { other.as_ptr().add(3).read() }, 42);

        unlink(&name);
    }

    #[test]
    fn create_fails_when_name_exists() {
        let name = unique_name();
        let _region = SharedRegion::create(&name, 16).unwrap();
        let again = SharedRegion::create(&name, 16);
        assert!(matches!(again, Err(ArenaError::Allocation { .. })));
        unlink(&name);
    }

    #[test]
    fn open_fails_on_missing_or_short_segment() {
        let name = unique_name();
        assert!(matches!(
            SharedRegion::open(&name, 1, Access::ReadWrite),
            Err(ArenaError::Attach { .. })
        ));

        let _region = SharedRegion::create(&name, 8).unwrap();
        assert!(matches!(
            SharedRegion::open(&name, 9, Access::ReadWrite),
            Err(ArenaError::Attach { .. })
        ));
        unlink(&name);
    }

    #[test]
    fn unlink_is_idempotent() {
        let name = unique_name();
        let _region = SharedRegion::create(&name, 8).unwrap();
        unlink(&name);
        unlink(&name);
    }
}
