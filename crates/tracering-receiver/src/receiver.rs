//! Single-threaded poll loop over the shared ring.
//!
//! Grounded directly on `original_source/src/core/receiver.c`:
//! `tracer_receiver_init`/`_poll`/`_shutdown` translate almost one to one
//! onto `Receiver::init`/`poll`/`shutdown`, with the dispatcher and handler
//! registration delegated to `tracering-dispatch`.

use std::sync::Arc;

use tracering_core::{Event, SharedMemory};
use tracering_dispatch::{DispatchError, Dispatcher, HandlerRegistry};

use crate::config::ReceiverConfig;
use crate::error::ReceiverError;

/// Owns the shared-memory ring and the event dispatcher fanning it out.
///
/// `poll()` must be called from a single thread at a time — the same
/// single-consumer contract the ring ABI itself assumes. This is a
/// documented misuse boundary, not one enforced by the type system, exactly
/// as in the C original.
pub struct Receiver {
    shm: SharedMemory,
    shm_name: &'static str,
    dispatcher: Arc<Dispatcher<Event>>,
    registry: HandlerRegistry<Event>,
    allow_overwrite: bool,
}

impl Receiver {
    /// Creates the shared-memory ring (truncating/zeroing it) and the
    /// handler dispatcher.
    pub fn init(config: ReceiverConfig) -> Result<Self, ReceiverError> {
        let shm = SharedMemory::create(config.shm_name)?;
        let dispatcher = Arc::new(Dispatcher::create(
            config.handler_capacity,
            config.worker_count,
        ));
        let registry = HandlerRegistry::new(Arc::clone(&dispatcher));

        log::debug!(
            "receiver initialized: shm={:?} handler_capacity={} worker_count={}",
            config.shm_name,
            config.handler_capacity,
            config.worker_count
        );

        Ok(Self {
            shm,
            shm_name: config.shm_name,
            dispatcher,
            registry,
            allow_overwrite: config.allow_overwrite,
        })
    }

    /// Drains every event currently visible in `[read_index, write_index)`,
    /// dispatching each one in order, advancing `read_index` after every
    /// dispatch and re-reading `write_index` so a producer racing ahead
    /// during this call is picked up in the same poll.
    pub fn poll(&self) {
        let ring = self.shm.ring();

        let mut read_idx = ring.read_index();
        let mut write_idx = ring.write_index_acquire();
        let mut drained = 0u32;

        while read_idx != write_idx {
            let event = ring.slot(read_idx);
            self.dispatcher.emit(&event);
            read_idx = read_idx.wrapping_add(1);
            ring.advance_read(read_idx, self.allow_overwrite);
            drained += 1;
            write_idx = ring.write_index_acquire();
        }

        if drained > 0 {
            log::debug!("poll drained {drained} events");
        }
        if drained as usize >= tracering_core::SharedRing::CAPACITY {
            log::warn!("poll drained a full ring ({drained} events) — producers may have dropped events");
        }
    }

    /// Whether the ring was configured to allow producers to overwrite
    /// unconsumed slots. Emitters must agree on this by convention.
    #[must_use]
    pub fn allow_overwrite(&self) -> bool {
        self.allow_overwrite
    }

    pub fn register_handler(&self, handler: fn(&Event)) -> Result<(), DispatchError> {
        self.registry.register(handler)
    }

    pub fn unregister_handler(&self, handler: fn(&Event)) -> Result<(), DispatchError> {
        self.registry.unregister(handler)
    }

    pub fn register_handler_with_context<C: Send + Sync + 'static>(
        &self,
        handler: fn(&Event, &C),
        ctx: Arc<C>,
    ) -> Result<(), DispatchError> {
        self.registry.register_with_context(handler, ctx)
    }

    pub fn unregister_handler_with_context<C: Send + Sync + 'static>(
        &self,
        ctx: &Arc<C>,
    ) -> Result<(), DispatchError> {
        self.registry.unregister_with_context(ctx)
    }

    pub fn unregister_handler_by_context(&self, ctx_addr: usize) -> Result<(), DispatchError> {
        self.registry.unregister_by_context(ctx_addr)
    }

    /// Snapshot of the ring's publish/drop/consume counters.
    #[must_use]
    pub fn metrics(&self) -> tracering_core::MetricsSnapshot {
        self.shm.ring().metrics()
    }

    /// Drops the dispatcher (joining any worker threads), unmaps the shared
    /// memory, then unlinks the named object so the next `Receiver::init`
    /// starts from a fresh segment.
    pub fn shutdown(self) {
        drop(self.dispatcher);
        drop(self.shm);
        if let Err(err) = tracering_core::unlink(self.shm_name) {
            log::error!("failed to unlink shared trace ring: {err}");
        }
    }
}
