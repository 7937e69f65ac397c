//! Producer-side handle: stamps an [`Event`] and publishes it to a
//! [`SharedRing`] it does not own the lifecycle of (the receiver creates the
//! shared-memory segment; the emitter only opens it).

use crate::config::Config;
use crate::event::Event;
use crate::shm::{SharedMemory, ShmError};

/// A clock/thread-id source, factored out so tests can stamp events
/// deterministically instead of depending on the real OS clock and thread id.
pub trait PlatformClock: Send + Sync {
    fn now_nanos(&self) -> u64;
    fn thread_id(&self) -> u32;
}

/// The real clock: `CLOCK_MONOTONIC` nanoseconds and the OS thread id,
/// mirroring the C original's `clock_gettime`/`gettid` pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl PlatformClock for StdClock {
    fn now_nanos(&self) -> u64 {
        monotonic_nanos()
    }

    fn thread_id(&self) -> u32 {
        os_thread_id()
    }
}

#[cfg(unix)]
fn monotonic_nanos() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, exclusively-owned out-param.
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64)
        .wrapping_mul(1_000_000_000)
        .wrapping_add(ts.tv_nsec as u64)
}

#[cfg(not(unix))]
fn monotonic_nanos() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(target_os = "linux")]
fn os_thread_id() -> u32 {
    // SAFETY: SYS_gettid takes no arguments and always succeeds.
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

#[cfg(not(target_os = "linux"))]
fn os_thread_id() -> u32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    (hasher.finish() & 0xFFFF_FFFF) as u32
}

/// Stamps `label` with the real clock.
#[must_use]
pub fn stamp(label: &str) -> Event {
    stamp_with(&StdClock, label)
}

/// Stamps `label` with a caller-supplied clock, for deterministic tests.
#[must_use]
pub fn stamp_with(clock: &dyn PlatformClock, label: &str) -> Event {
    Event::new(clock.now_nanos(), clock.thread_id(), label)
}

/// Producer-side fabric handle: opens the shared ring and publishes events
/// into it. Cheap to construct per trace site is not the intended use —
/// callers are expected to hold one `Emitter` for the process's lifetime.
pub struct Emitter {
    shm: SharedMemory,
    allow_overwrite: bool,
}

impl Emitter {
    /// Opens the shared-memory ring named in `config`. Fails if the receiver
    /// has not yet created it.
    pub fn init(config: Config) -> Result<Self, ShmError> {
        let shm = SharedMemory::open(config.shm_name)?;
        Ok(Self {
            shm,
            allow_overwrite: config.allow_overwrite,
        })
    }

    /// Stamps and publishes `label` with the real clock. Returns `false` if
    /// the ring was full and the overwrite policy is disabled.
    pub fn emit(&self, label: &str) -> bool {
        self.emit_with(&StdClock, label)
    }

    /// Stamps and publishes `label` using a caller-supplied clock.
    pub fn emit_with(&self, clock: &dyn PlatformClock, label: &str) -> bool {
        self.publish(stamp_with(clock, label))
    }

    /// Publishes an already-built event.
    pub fn publish(&self, event: Event) -> bool {
        self.shm.ring().publish(event, self.allow_overwrite)
    }

    /// Unmaps this emitter's view of the shared ring. Does not unlink the
    /// named object — the receiver owns that, on its own `shutdown` (the
    /// ring may still have other emitters attached).
    pub fn shutdown(self) {
        log::debug!("emitter shutting down");
        drop(self.shm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(u64, u32);

    impl PlatformClock for FixedClock {
        fn now_nanos(&self) -> u64 {
            self.0
        }

        fn thread_id(&self) -> u32 {
            self.1
        }
    }

    #[test]
    fn stamp_with_uses_supplied_clock() {
        let e = stamp_with(&FixedClock(42, 9), "span.begin");
        assert_eq!(e.timestamp, 42);
        assert_eq!(e.thread_id, 9);
        assert_eq!(e.label(), "span.begin");
    }
}
