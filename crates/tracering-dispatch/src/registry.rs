//! Ergonomic handler registration on top of a raw [`Dispatcher`].
//!
//! Grounded on `include/tracering/receiver.hpp`'s `Wrapper`/`wrapper_map`
//! pattern: a context-carrying registration boxes its callback and context
//! together, registers the box's own address as the dispatcher context, and
//! keeps the box alive in a side table until the caller explicitly
//! unregisters it (the Rust translation of `std::unique_ptr<Wrapper>` kept
//! in an `unordered_map` keyed by pointer identity).

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dispatcher::{Dispatcher, HandlerFn};
use crate::error::DispatchError;

struct Binding<P, C> {
    cb: fn(&P, &C),
    ctx: Arc<C>,
}

fn plain_trampoline<P: Send + Sync + 'static>(payload: &P, ctx: usize) {
    // SAFETY: `ctx` was produced by `cb as usize` for a `fn(&P)` value in
    // `HandlerRegistry::register`, and function pointers round-trip through
    // `usize` losslessly on every platform Rust targets.
    let cb: fn(&P) = unsafe { std::mem::transmute(ctx) };
    cb(payload);
}

fn context_trampoline<P, C>(payload: &P, context_addr: usize)
where
    P: Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    // SAFETY: `context_addr` is the address of a `Binding<P, C>` boxed by
    // `register_with_context` and kept alive in this registry's side table
    // until the matching unregister call drops it.
    let binding = unsafe { &*(context_addr as *const Binding<P, C>) };
    (binding.cb)(payload, &binding.ctx);
}

struct ErasedBinding<P: Send + Sync + 'static> {
    trampoline: HandlerFn<P>,
    context_addr: usize,
    // Owns the `Box<Binding<P, C>>` for some `C` erased to `Any`; dropping
    // this drops the binding (and the caller's `Arc<C>` clone) together.
    _keep_alive: Box<dyn Any + Send + Sync>,
}

/// Context-free and context-carrying registration on top of a
/// [`Dispatcher<P>`], matching the four operations the stack-trace adapter
/// and the receiver's public API both need.
pub struct HandlerRegistry<P: Send + Sync + 'static> {
    dispatcher: Arc<Dispatcher<P>>,
    bindings: Mutex<HashMap<usize, ErasedBinding<P>>>,
}

impl<P: Send + Sync + 'static> HandlerRegistry<P> {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher<P>>) -> Self {
        Self {
            dispatcher,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying dispatcher, for callers that need `emit`/`len` directly.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher<P>> {
        &self.dispatcher
    }

    /// Registers a plain, context-free handler. The function pointer itself
    /// is used as its own dispatcher context, so registering the same `cb`
    /// twice collides on pointer identity and is a documented no-op (two
    /// distinct monomorphizations of one generic function are permitted by
    /// the language to share an address, in which case they are
    /// indistinguishable here by design).
    pub fn register(&self, cb: fn(&P)) -> Result<(), DispatchError> {
        self.dispatcher
            .register(plain_trampoline::<P>, cb as usize)
    }

    pub fn unregister(&self, cb: fn(&P)) -> Result<(), DispatchError> {
        self.dispatcher
            .unregister(plain_trampoline::<P>, cb as usize)
    }

    /// Registers `cb` with a context, keeping `ctx` alive until explicitly
    /// unregistered. Re-registering the same `Arc<C>` (by pointer) while a
    /// handler for it is still registered is a no-op, mirroring the
    /// context-free duplicate rule.
    pub fn register_with_context<C: Send + Sync + 'static>(
        &self,
        cb: fn(&P, &C),
        ctx: Arc<C>,
    ) -> Result<(), DispatchError> {
        let key = Arc::as_ptr(&ctx) as usize;

        let mut bindings = self.bindings.lock().unwrap();
        if bindings.contains_key(&key) {
            return Ok(());
        }

        let binding = Box::new(Binding { cb, ctx });
        let context_addr = std::ptr::from_ref(binding.as_ref()) as usize;
        let trampoline: HandlerFn<P> = context_trampoline::<P, C>;

        self.dispatcher.register(trampoline, context_addr)?;
        bindings.insert(
            key,
            ErasedBinding {
                trampoline,
                context_addr,
                _keep_alive: binding,
            },
        );
        Ok(())
    }

    /// Unregisters the handler registered for `ctx`, by `Arc` pointer identity.
    pub fn unregister_with_context<C: Send + Sync + 'static>(
        &self,
        ctx: &Arc<C>,
    ) -> Result<(), DispatchError> {
        self.unregister_by_context(Arc::as_ptr(ctx) as usize)
    }

    /// Unregisters the handler registered under the given context-pointer
    /// identity, without knowing its concrete context type — the case a
    /// language-wrapper closure with its own opaque handle needs.
    pub fn unregister_by_context(&self, ctx_addr: usize) -> Result<(), DispatchError> {
        let mut bindings = self.bindings.lock().unwrap();
        let Some(entry) = bindings.remove(&ctx_addr) else {
            return Err(DispatchError::NotFound);
        };
        self.dispatcher
            .unregister(entry.trampoline, entry.context_addr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop(_payload: &u32) {}

    #[test]
    fn plain_register_duplicate_is_no_op() {
        let registry = HandlerRegistry::new(Arc::new(Dispatcher::<u32>::create(4, 0)));
        registry.register(noop).unwrap();
        registry.register(noop).unwrap();
        assert_eq!(registry.dispatcher().len(), 1);
    }

    #[test]
    fn context_registration_runs_and_cleans_up() {
        struct Counter(AtomicUsize);
        fn on_event(payload: &u32, ctx: &Counter) {
            ctx.0.fetch_add(*payload as usize, Ordering::SeqCst);
        }

        let dispatcher = Arc::new(Dispatcher::<u32>::create(4, 0));
        let registry = HandlerRegistry::new(Arc::clone(&dispatcher));
        let ctx = Arc::new(Counter(AtomicUsize::new(0)));

        registry.register_with_context(on_event, Arc::clone(&ctx)).unwrap();
        dispatcher.emit(&5);
        assert_eq!(ctx.0.load(Ordering::SeqCst), 5);

        registry.unregister_with_context(&ctx).unwrap();
        dispatcher.emit(&5);
        assert_eq!(ctx.0.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn unregister_by_context_matches_registration_identity() {
        struct Tag;
        fn on_event(_payload: &u32, _ctx: &Tag) {}

        let dispatcher = Arc::new(Dispatcher::<u32>::create(4, 0));
        let registry = HandlerRegistry::new(Arc::clone(&dispatcher));
        let ctx = Arc::new(Tag);
        let ctx_addr = Arc::as_ptr(&ctx) as usize;

        registry.register_with_context(on_event, ctx).unwrap();
        assert_eq!(dispatcher.len(), 1);
        registry.unregister_by_context(ctx_addr).unwrap();
        assert_eq!(dispatcher.len(), 0);
    }
}
