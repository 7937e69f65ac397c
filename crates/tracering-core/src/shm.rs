//! POSIX shared-memory backing for [`crate::ring::RingHeader`].
//!
//! Grounded directly on the original `shm_open`/`ftruncate`/`mmap` sequence
//! this fabric's C implementation uses, translated to the `libc` crate.

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::ptr;

use thiserror::Error;

use crate::ring::{RingHeader, SharedRing};

#[derive(Debug, Error)]
pub enum ShmError {
    #[error("invalid shared-memory name {0:?}")]
    InvalidName(String),
    #[error("shm_open({name:?}) failed: {source}")]
    Open {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ftruncate({name:?}, {size}) failed: {source}")]
    Truncate {
        name: String,
        size: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("mmap({name:?}) failed: {source}")]
    Map {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("shm_unlink({name:?}) failed: {source}")]
    Unlink {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A `mmap`-backed [`RingHeader`], reachable from any process that opens the
/// same POSIX shared-memory name, wrapped in a [`SharedRing`] view that adds
/// this process's own metrics counters alongside the mapped bytes.
pub struct SharedMemory {
    ptr: *mut RingHeader,
    ring: SharedRing,
    fd: RawFd,
    name: String,
}

// SAFETY: the mapped region is read/written only through `SharedRing`'s own
// atomics and `UnsafeCell` slots, which are themselves `Send + Sync`.
unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    /// Creates (or re-creates) the shared-memory object, sizes it to fit a
    /// [`RingHeader`], maps it, and zero-initializes the ring's indices.
    /// This is the consumer-side entry point (`spec.md` §4.B: the receiver
    /// creates, the emitter opens).
    pub fn create(name: &str) -> Result<Self, ShmError> {
        let shm = Self::open_raw(name, true)?;
        shm.ring().reset();
        Ok(shm)
    }

    /// Opens an already-created shared-memory object. This is the
    /// producer-side entry point.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        Self::open_raw(name, false)
    }

    fn open_raw(name: &str, create: bool) -> Result<Self, ShmError> {
        let cname = CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))?;
        let size = std::mem::size_of::<RingHeader>();

        let flags = if create {
            libc::O_CREAT | libc::O_RDWR
        } else {
            libc::O_RDWR
        };

        // SAFETY: `cname` is a valid, nul-terminated C string for the
        // duration of this call.
        let fd = unsafe { libc::shm_open(cname.as_ptr(), flags, 0o600) };
        if fd < 0 {
            return Err(ShmError::Open {
                name: name.to_string(),
                source: std::io::Error::last_os_error(),
            });
        }

        if create {
            // SAFETY: `fd` was just opened above and is a valid shm fd.
            let rc = unsafe { libc::ftruncate(fd, size as libc::off_t) };
            if rc != 0 {
                let source = std::io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(ShmError::Truncate {
                    name: name.to_string(),
                    size,
                    source,
                });
            }
        }

        // SAFETY: `fd` refers to an object at least `size` bytes long (just
        // ensured above on create, or assumed already sized on open, per the
        // shared naming convention in `config::SHM_NAME`'s doc comment).
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            let source = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(ShmError::Map {
                name: name.to_string(),
                source,
            });
        }

        let ptr = addr.cast::<RingHeader>();
        // SAFETY: `ptr` now points at a freshly mapped, live `RingHeader`
        // that stays valid for as long as this `SharedMemory` (and the
        // `SharedRing` view constructed from it) is alive.
        let ring = unsafe { SharedRing::from_raw(ptr) };

        Ok(Self {
            ptr,
            ring,
            fd,
            name: name.to_string(),
        })
    }

    /// The mapped ring, viewed together with this process's own metrics.
    #[must_use]
    pub fn ring(&self) -> &SharedRing {
        &self.ring
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        let size = std::mem::size_of::<RingHeader>();
        unsafe {
            libc::munmap(self.ptr.cast::<libc::c_void>(), size);
            libc::close(self.fd);
        }
    }
}

/// Removes the named shared-memory object from the system. Typically called
/// by the receiver on clean shutdown; a crashed receiver leaves the segment
/// behind for the next run to reclaim via [`SharedMemory::create`].
pub fn unlink(name: &str) -> Result<(), ShmError> {
    let cname = CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))?;
    // SAFETY: `cname` is a valid, nul-terminated C string for this call.
    let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
    if rc != 0 {
        return Err(ShmError::Unlink {
            name: name.to_string(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}
