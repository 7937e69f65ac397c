//! Generic blocking fan-out engine.
//!
//! Grounded directly on `original_source/src/internal/dispatcher.c`'s
//! mutex/condvar trio (`cv_task`, `cv_space`, `cv_done`), translated from
//! `pthread_cond_t` to `std::sync::Condvar`. Deliberately not built on
//! `tokio`: `emit` is a blocking, synchronous-handoff call by contract, and
//! every caller (the receiver's poll loop, the adapter's span dispatch) is
//! already on its own dedicated thread.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::DispatchError;

/// Bounded task queue capacity in worker-pool mode, mirrors `MAX_QUEUE` in
/// the C original.
const MAX_QUEUE: usize = 128;

/// A registered handler: a plain function pointer plus an opaque context.
///
/// The context is a `usize` rather than a raw pointer so a `HandlerEntry` is
/// trivially `Send`/`Copy` without asserting anything unsound about what the
/// address actually points to — that burden is on whoever constructed the
/// context (see `tracering_dispatch::registry`).
pub type HandlerFn<P> = fn(&P, usize);

#[derive(Clone, Copy)]
struct HandlerEntry<P> {
    func: HandlerFn<P>,
    context: usize,
}

impl<P> PartialEq for HandlerEntry<P> {
    fn eq(&self, other: &Self) -> bool {
        self.func == other.func && self.context == other.context
    }
}

struct DispatchTask<P> {
    payload: *const P,
    handler: HandlerEntry<P>,
}

// SAFETY: a task is only ever read from the thread that pops it, and the
// pointee is guaranteed live until `Dispatcher::emit`'s `cv_done` wait
// returns (emit never returns before `pending_tasks` hits zero), so shared
// read access across worker threads is exactly what `P: Sync` promises.
unsafe impl<P: Sync> Send for DispatchTask<P> {}

struct State<P> {
    handlers: Vec<HandlerEntry<P>>,
    handler_cap: usize,
    queue: VecDeque<DispatchTask<P>>,
    pending_tasks: usize,
}

struct Shared<P> {
    state: Mutex<State<P>>,
    cv_task: Condvar,
    cv_space: Condvar,
    cv_done: Condvar,
    running: std::sync::atomic::AtomicBool,
}

/// A generic fan-out dispatcher: `register` handlers, `emit` a payload to
/// all of them, blocking until every handler has run.
///
/// `num_workers == 0` at construction selects synchronous mode (`emit` runs
/// handlers inline, under the registry lock, in registration order).
/// `num_workers > 0` spawns that many worker threads immediately and `emit`
/// instead enqueues one task per handler and waits for the round to drain.
pub struct Dispatcher<P: Send + Sync + 'static> {
    shared: Arc<Shared<P>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    threaded: bool,
}

impl<P: Send + Sync + 'static> Dispatcher<P> {
    #[must_use]
    pub fn create(max_handlers: usize, num_workers: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                handlers: Vec::with_capacity(max_handlers),
                handler_cap: max_handlers,
                queue: VecDeque::with_capacity(MAX_QUEUE.min(max_handlers.max(1))),
                pending_tasks: 0,
            }),
            cv_task: Condvar::new(),
            cv_space: Condvar::new(),
            cv_done: Condvar::new(),
            running: std::sync::atomic::AtomicBool::new(true),
        });

        let threaded = num_workers > 0;
        let mut threads = Vec::with_capacity(num_workers);
        if threaded {
            for i in 0..num_workers {
                let shared = Arc::clone(&shared);
                threads.push(
                    thread::Builder::new()
                        .name(format!("tracering-dispatch-{i}"))
                        .spawn(move || worker_loop(&shared))
                        .expect("failed to spawn dispatcher worker thread"),
                );
            }
            log::trace!("dispatcher spawned {num_workers} worker threads");
        }

        Self {
            shared,
            threads: Mutex::new(threads),
            threaded,
        }
    }

    /// Current number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this dispatcher was created with a worker pool.
    #[must_use]
    pub fn is_worker_mode(&self) -> bool {
        self.threaded
    }

    /// Registers `(func, context)`. A duplicate registration (same function
    /// pointer and same context) is a no-op, returning `Ok(())`.
    pub fn register(&self, func: HandlerFn<P>, context: usize) -> Result<(), DispatchError> {
        let entry = HandlerEntry { func, context };
        let mut state = self.shared.state.lock().unwrap();
        if state.handlers.contains(&entry) {
            return Ok(());
        }
        if state.handlers.len() >= state.handler_cap {
            return Err(DispatchError::CapacityExceeded {
                max: state.handler_cap,
            });
        }
        state.handlers.push(entry);
        Ok(())
    }

    /// Removes a `(func, context)` registration.
    pub fn unregister(&self, func: HandlerFn<P>, context: usize) -> Result<(), DispatchError> {
        let entry = HandlerEntry { func, context };
        let mut state = self.shared.state.lock().unwrap();
        let before = state.handlers.len();
        state.handlers.retain(|h| *h != entry);
        if state.handlers.len() == before {
            Err(DispatchError::NotFound)
        } else {
            Ok(())
        }
    }

    /// Dispatches `payload` to every registered handler, blocking until all
    /// of them have returned.
    pub fn emit(&self, payload: &P) {
        let mut state = self.shared.state.lock().unwrap();

        if !self.threaded {
            for h in &state.handlers {
                (h.func)(payload, h.context);
            }
            return;
        }

        while state.queue.len() + state.handlers.len() > MAX_QUEUE {
            state = self.shared.cv_space.wait(state).unwrap();
        }

        let handlers = state.handlers.clone();
        for handler in handlers {
            state.queue.push_back(DispatchTask {
                payload: std::ptr::from_ref(payload),
                handler,
            });
            state.pending_tasks += 1;
        }
        self.shared.cv_task.notify_all();

        while state.pending_tasks > 0 {
            state = self.shared.cv_done.wait(state).unwrap();
        }
    }
}

fn worker_loop<P: Send + Sync + 'static>(shared: &Arc<Shared<P>>) {
    use std::sync::atomic::Ordering;

    loop {
        let mut state = shared.state.lock().unwrap();
        while state.queue.is_empty() && shared.running.load(Ordering::Acquire) {
            state = shared.cv_task.wait(state).unwrap();
        }
        if !shared.running.load(Ordering::Acquire) {
            // Mirrors the C original: a worker exits on shutdown even with
            // tasks still queued, rather than draining them.
            return;
        }

        let task = state.queue.pop_front().expect("queue non-empty under lock");
        shared.cv_space.notify_one();
        drop(state);

        // SAFETY: `task.payload` stays valid until the `emit` call that
        // enqueued it returns, which only happens after `pending_tasks`
        // drops to zero below.
        let payload = unsafe { &*task.payload };
        (task.handler.func)(payload, task.handler.context);

        let mut state = shared.state.lock().unwrap();
        state.pending_tasks -= 1;
        if state.pending_tasks == 0 {
            shared.cv_done.notify_one();
        }
    }
}

impl<P: Send + Sync + 'static> Drop for Dispatcher<P> {
    fn drop(&mut self) {
        self.shared
            .running
            .store(false, std::sync::atomic::Ordering::Release);
        self.shared.cv_task.notify_all();
        for t in self.threads.lock().unwrap().drain(..) {
            let _ = t.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn count_handler(_payload: &u32, _ctx: usize) {
        COUNTER.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn synchronous_emit_calls_all_handlers_in_order() {
        COUNTER.store(0, Ordering::SeqCst);
        let d = Dispatcher::<u32>::create(4, 0);
        d.register(count_handler, 0).unwrap();
        d.register(count_handler, 1).unwrap();
        d.emit(&7);
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_registration_is_a_no_op() {
        let d = Dispatcher::<u32>::create(4, 0);
        assert_eq!(d.register(count_handler, 0), Ok(()));
        assert_eq!(d.register(count_handler, 0), Ok(()));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn capacity_exceeded_is_reported() {
        let d = Dispatcher::<u32>::create(1, 0);
        d.register(count_handler, 0).unwrap();
        assert_eq!(
            d.register(count_handler, 1),
            Err(DispatchError::CapacityExceeded { max: 1 })
        );
    }

    #[test]
    fn unregister_missing_handler_is_not_found() {
        let d = Dispatcher::<u32>::create(4, 0);
        assert_eq!(
            d.unregister(count_handler, 0),
            Err(DispatchError::NotFound)
        );
    }

    #[test]
    fn worker_mode_emit_blocks_until_all_handlers_ran() {
        COUNTER.store(0, Ordering::SeqCst);
        let d = Dispatcher::<u32>::create(8, 4);
        for ctx in 0..8 {
            d.register(count_handler, ctx).unwrap();
        }
        for payload in 0..20 {
            d.emit(&payload);
        }
        assert_eq!(COUNTER.load(Ordering::SeqCst), 20 * 8);
    }
}
