use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::RING_SIZE;
use crate::event::Event;
use crate::invariants::{debug_assert_bounded_count, debug_assert_monotonic};
use crate::metrics::Metrics;

/// The cross-process shared ring's on-the-wire layout. This, and only this,
/// is `mmap`ed between the producer and consumer binaries: a 4-byte
/// `read_index`, a 4-byte `write_index`, natural `repr(C)` padding, then
/// `N * size_of::<Event>()` bytes of event storage. `N = 4096`, fixed.
/// `spec.md` §6 describes exactly these bytes and no others — counters live
/// outside this type, see [`SharedRing`].
///
/// This is the single-watermark variant (no per-slot validity bitmap): the
/// `write_index` atomic is itself the publication watermark. See
/// `SPEC_FULL.md` §2 for why the bitmap variant was not adopted.
#[repr(C)]
pub struct RingHeader {
    read_index: AtomicU32,
    write_index: AtomicU32,
    events: [UnsafeCell<Event>; RING_SIZE],
}

// SAFETY: every slot is written by at most one producer at a time (each
// reserved index is unique, handed out by `fetch_add`) and read only by the
// single consumer after observing the writer's `Release` store on
// `write_index`, which this type's `publish`/`slot` pair upholds.
unsafe impl Send for RingHeader {}
unsafe impl Sync for RingHeader {}

impl RingHeader {
    /// Ring capacity, `N = 4096`.
    pub const CAPACITY: usize = RING_SIZE;

    const fn mask() -> u32 {
        (RING_SIZE - 1) as u32
    }

    /// Allocates a new, zeroed header on the heap. All-zero bytes are a
    /// valid `RingHeader` (indices at 0, every slot `Event::empty()`), so a
    /// zeroing allocation skips the cost of constructing 4096 slots by hand.
    #[must_use]
    pub fn alloc_boxed() -> Box<RingHeader> {
        let layout = Layout::new::<RingHeader>();
        unsafe {
            let ptr = alloc::alloc_zeroed(layout);
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }
            Box::from_raw(ptr.cast::<RingHeader>())
        }
    }
}

/// A [`RingHeader`] plus process-local publish/drop/consume counters.
///
/// The counters are deliberately *not* part of `RingHeader`'s `repr(C)`
/// layout: `spec.md` §6 only describes the indices and event storage as the
/// shared-memory ABI, so metrics live alongside the header in normal heap
/// memory, owned by whichever process is observing this ring (an emitter
/// tracks its own publishes/drops, a receiver its own consumes).
pub struct SharedRing {
    header: *mut RingHeader,
    owns_header: bool,
    metrics: Metrics,
}

// SAFETY: `header` is only ever dereferenced through `RingHeader`'s own
// atomics/`UnsafeCell` slots, which are themselves `Send + Sync`; `metrics`
// is `Send + Sync` on its own.
unsafe impl Send for SharedRing {}
unsafe impl Sync for SharedRing {}

impl SharedRing {
    /// Ring capacity, `N = 4096`.
    pub const CAPACITY: usize = RingHeader::CAPACITY;

    /// Wraps a raw, already-live `RingHeader` pointer with fresh,
    /// process-local metrics. Used by [`crate::shm::SharedMemory`] to view
    /// an `mmap`ed header without taking ownership of it.
    ///
    /// # Safety
    /// `header` must point to a valid `RingHeader` that outlives the
    /// returned `SharedRing`.
    #[must_use]
    pub unsafe fn from_raw(header: *mut RingHeader) -> Self {
        Self {
            header,
            owns_header: false,
            metrics: Metrics::new(),
        }
    }

    /// Allocates a new, zeroed ring on the heap for in-process use (tests,
    /// or a producer and consumer sharing one address space).
    #[must_use]
    pub fn alloc_boxed() -> Box<SharedRing> {
        let header = Box::into_raw(RingHeader::alloc_boxed());
        Box::new(Self {
            header,
            owns_header: true,
            metrics: Metrics::new(),
        })
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: `header` is valid for the lifetime of `self`, per the
        // contract of `from_raw`/`alloc_boxed`.
        unsafe { &*self.header }
    }

    /// Zeroes the indices. Called once by the consumer after creating or
    /// mapping the shared region (`spec.md` §4.B: "consumer truncates on
    /// create").
    pub fn reset(&self) {
        let header = self.header();
        header.read_index.store(0, Ordering::Release);
        header.write_index.store(0, Ordering::Release);
    }

    /// Current `read_index`, loaded with acquire ordering.
    #[must_use]
    pub fn read_index(&self) -> u32 {
        self.header().read_index.load(Ordering::Acquire)
    }

    /// Current `write_index`, loaded with acquire ordering.
    #[must_use]
    pub fn write_index_acquire(&self) -> u32 {
        self.header().write_index.load(Ordering::Acquire)
    }

    /// Reserves a slot and writes `event` into it.
    ///
    /// Under the non-overwrite policy (`allow_overwrite == false`), returns
    /// `false` without publishing when `write_index - read_index >= N`.
    /// Under the overwrite policy, always succeeds (a slow consumer may then
    /// observe a torn or stale slot — see `SPEC_FULL.md` §9).
    pub fn publish(&self, event: Event, allow_overwrite: bool) -> bool {
        let header = self.header();

        if !allow_overwrite {
            let write = header.write_index.load(Ordering::Relaxed);
            let read = header.read_index.load(Ordering::Acquire);
            if write.wrapping_sub(read) as usize >= Self::CAPACITY {
                self.metrics.add_dropped(1);
                return false;
            }
        }

        let idx = header.write_index.fetch_add(1, Ordering::AcqRel);
        let slot = (idx & RingHeader::mask()) as usize;

        // SAFETY: `idx` was exclusively reserved by this fetch_add; no other
        // producer writes this slot until `write_index` wraps back around
        // after the consumer has advanced `read_index` past it.
        unsafe {
            *header.events[slot].get() = event;
        }

        self.metrics.add_published(1);
        true
    }

    /// Copies the event at raw (unmasked) sequence `idx`.
    ///
    /// The caller — the single consumer — must only call this for indices
    /// in `[read_index, write_index)` as observed via an acquire load of
    /// `write_index`, so that the read happens-after the producer's
    /// publishing `Release` store.
    #[must_use]
    pub fn slot(&self, idx: u32) -> Event {
        let header = self.header();
        let slot = (idx & RingHeader::mask()) as usize;
        // SAFETY: see above; the consumer never races the producer for the
        // same physical slot because it only reads indices already
        // published and not yet advanced past.
        unsafe { *header.events[slot].get() }
    }

    /// Advances `read_index` to `to` (the pre-incremented index plus one, per
    /// `spec.md` §9 — storing the *advanced* value, not the pre-increment
    /// one some C variants mistakenly store).
    ///
    /// `allow_overwrite` must reflect the same policy passed to `publish`:
    /// under the overwrite policy a producer may run arbitrarily far ahead
    /// of the consumer (`spec.md` §3 — bounded count is *not* guaranteed
    /// there), so the bounded-count check only applies under non-overwrite.
    pub fn advance_read(&self, to: u32, allow_overwrite: bool) {
        let header = self.header();
        let current = header.read_index.load(Ordering::Relaxed);
        debug_assert_monotonic!("read_index", current, to);
        if !allow_overwrite {
            let write = header.write_index.load(Ordering::Relaxed);
            debug_assert_bounded_count!(write.wrapping_sub(to) as usize, Self::CAPACITY);
        }
        header.read_index.store(to, Ordering::Release);
        self.metrics.add_consumed(1);
    }

    /// Snapshot of this process's publish/drop/consume counters.
    #[must_use]
    pub fn metrics(&self) -> crate::metrics::MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for SharedRing {
    fn drop(&mut self) {
        if self.owns_header {
            // SAFETY: `owns_header` is only set by `alloc_boxed`, which
            // allocated this exact pointer via `RingHeader::alloc_boxed`.
            unsafe {
                drop(Box::from_raw(self.header));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_slot_round_trips() {
        let ring = SharedRing::alloc_boxed();
        let e = Event::new(100, 7, "A");
        assert!(ring.publish(e, false));
        assert_eq!(ring.write_index_acquire(), 1);
        assert_eq!(ring.slot(0), e);
    }

    #[test]
    fn non_overwrite_drops_past_capacity() {
        let ring = SharedRing::alloc_boxed();
        for i in 0..SharedRing::CAPACITY {
            assert!(ring.publish(Event::new(i as u64, 0, "x"), false));
        }
        assert!(!ring.publish(Event::new(0, 0, "x"), false));
        assert_eq!(ring.metrics().dropped, 1);
    }

    #[test]
    fn draining_then_publishing_again_succeeds() {
        let ring = SharedRing::alloc_boxed();
        for i in 0..SharedRing::CAPACITY {
            assert!(ring.publish(Event::new(i as u64, 0, "x"), false));
        }
        ring.advance_read(SharedRing::CAPACITY as u32, false);
        assert!(ring.publish(Event::new(999, 0, "y"), false));
    }

    #[test]
    fn overwrite_policy_never_drops() {
        let ring = SharedRing::alloc_boxed();
        for i in 0..(SharedRing::CAPACITY + 10) {
            assert!(ring.publish(Event::new(i as u64, 0, "x"), true));
        }
        assert_eq!(ring.metrics().dropped, 0);
    }

    #[test]
    fn advance_read_past_capacity_is_fine_under_overwrite() {
        let ring = SharedRing::alloc_boxed();
        for i in 0..(SharedRing::CAPACITY + 2000) {
            ring.publish(Event::new(i as u64, 0, "x"), true);
        }
        // Producer ran far ahead of the consumer; this must not panic.
        ring.advance_read(1, true);
    }
}
