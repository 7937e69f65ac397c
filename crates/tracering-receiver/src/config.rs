use tracering_core::config::SHM_NAME;

/// Default handler-table capacity, mirrors the teacher's own modest
/// defaults for fixed-capacity tables.
const DEFAULT_HANDLER_CAPACITY: usize = 16;
const DEFAULT_WORKER_COUNT: usize = 4;

/// Configuration for a [`crate::Receiver`].
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    /// Name of the shared-memory object to create.
    pub shm_name: &'static str,
    /// Maximum number of event handlers that can be registered at once.
    pub handler_capacity: usize,
    /// Number of dispatcher worker threads. `0` selects synchronous
    /// dispatch (handlers run inline on the polling thread).
    pub worker_count: usize,
    /// Whether producers may overwrite unconsumed slots once the ring is
    /// full. Must match the emitters' own setting; see
    /// `tracering_core::config::Config::with_overwrite`.
    pub allow_overwrite: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            shm_name: SHM_NAME,
            handler_capacity: DEFAULT_HANDLER_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            allow_overwrite: false,
        }
    }
}

impl ReceiverConfig {
    /// Synchronous dispatch, minimal handler capacity: favors the shortest
    /// path from `poll()` to handler execution over fan-out parallelism.
    #[must_use]
    pub fn low_latency() -> Self {
        Self {
            worker_count: 0,
            handler_capacity: 8,
            ..Self::default()
        }
    }

    /// A larger worker pool and handler table, for deployments fanning
    /// events out to many slow handlers.
    #[must_use]
    pub fn high_throughput() -> Self {
        Self {
            worker_count: 8,
            handler_capacity: 32,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_shm_name(mut self, name: &'static str) -> Self {
        self.shm_name = name;
        self
    }

    #[must_use]
    pub const fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }
}
