/// Fixed POSIX shared-memory object name. The producer and consumer of a
/// given version of this crate MUST agree on this name, on `N`, on the
/// event size and on the index field layout (§6 of the ABI).
pub const SHM_NAME: &str = "/tracering_shm";

/// Ring size as a power of two: `N = 2^RING_BITS`.
pub const RING_BITS: u32 = 12;

/// Ring capacity, `N = 4096`.
pub const RING_SIZE: usize = 1 << RING_BITS;

/// Configuration shared by the emitter and receiver sides of the ring.
///
/// `allow_overwrite` models the C original's compile-time
/// `TRACER_ALLOW_OVERWRITE` flag as a runtime setting. Producer and
/// consumer processes must agree on this by convention, the same trust
/// boundary already placed on ring size and event layout.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Name of the shared-memory object to create/open.
    pub shm_name: &'static str,
    /// When `false` (default), producers drop events once the ring is full
    /// rather than overwriting unconsumed slots.
    pub allow_overwrite: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shm_name: SHM_NAME,
            allow_overwrite: false,
        }
    }
}

impl Config {
    /// Creates a configuration with a custom shared-memory name, useful for
    /// running multiple independent rings (e.g. in tests) side by side.
    #[must_use]
    pub const fn with_shm_name(mut self, name: &'static str) -> Self {
        self.shm_name = name;
        self
    }

    /// Enables the overwrite policy. Producers then always succeed but the
    /// consumer may miss events older than the most recent `N`; a consumer
    /// may also observe a partially-written slot, since this ring uses the
    /// single-watermark variant without a per-slot validity bitmap. See
    /// `SPEC_FULL.md` §9.
    #[must_use]
    pub const fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }
}
