//! Event record, shared-memory ring ABI and producer-side emitter for the
//! tracering fabric. This crate defines the wire format two otherwise
//! unrelated processes must agree on: [`event::Event`]'s byte layout,
//! [`ring::SharedRing`]'s index protocol, and [`config::SHM_NAME`].
//!
//! Consumers of this crate typically want [`emitter::Emitter`] (producer
//! side) or [`ring::SharedRing`] directly plus `tracering-receiver` (consumer
//! side).

pub mod config;
pub mod emitter;
pub mod event;
pub mod metrics;
pub mod ring;
pub mod shm;

mod invariants;

pub use config::Config;
pub use emitter::{stamp, stamp_with, Emitter, PlatformClock, StdClock};
pub use event::Event;
pub use metrics::{Metrics, MetricsSnapshot};
pub use ring::{RingHeader, SharedRing};
pub use shm::{unlink, ShmError, SharedMemory};
