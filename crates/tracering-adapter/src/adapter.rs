//! Turns a receiver's raw event stream into spans.
//!
//! Grounded on `original_source/src/adapter/stack_trace.c`'s
//! `stack_trace_event_handler`: ignore an empty label; look up (or
//! allocate) the emitting thread's shadow stack; if the label matches the
//! top of that stack, pop it and emit a completed span; otherwise push a
//! new open span. The adapter mutex is released before notifying span
//! handlers, exactly as the original releases its lock before
//! `notify_handlers`.

use std::sync::{Arc, Mutex};

use tracering_core::Event;
use tracering_dispatch::{DispatchError, Dispatcher, HandlerRegistry};
use tracering_receiver::Receiver;

use crate::config::AdapterConfig;
use crate::invariants::debug_assert_span_ordered;
use crate::shadow_stack::ShadowStack;
use crate::span::{Span, PATH_MAX};
use crate::thread_table::ThreadTable;

struct AdapterInner {
    table: Mutex<ThreadTable>,
    span_dispatcher: Arc<Dispatcher<Span>>,
}

/// Subscribes to a receiver's events and emits `Span`s for matched
/// begin/end label pairs, per thread.
pub struct StackTraceAdapter {
    inner: Arc<AdapterInner>,
    span_registry: HandlerRegistry<Span>,
}

impl StackTraceAdapter {
    /// Builds the adapter's own synchronous span dispatcher and an empty
    /// thread table. Does not yet subscribe to any receiver — call
    /// [`Self::attach`] for that.
    pub fn init(config: AdapterConfig) -> Result<Self, DispatchError> {
        let span_dispatcher = Arc::new(Dispatcher::create(config.handler_capacity, 0));
        let inner = Arc::new(AdapterInner {
            table: Mutex::new(ThreadTable::new(config.thread_table_size, config.stack_depth)),
            span_dispatcher: Arc::clone(&span_dispatcher),
        });
        let span_registry = HandlerRegistry::new(span_dispatcher);
        Ok(Self {
            inner,
            span_registry,
        })
    }

    /// Subscribes this adapter to `receiver`'s event stream.
    pub fn attach(&self, receiver: &Receiver) -> Result<(), DispatchError> {
        receiver.register_handler_with_context(Self::handle_event, Arc::clone(&self.inner))
    }

    /// Unsubscribes this adapter from `receiver`'s event stream.
    pub fn detach(&self, receiver: &Receiver) -> Result<(), DispatchError> {
        receiver.unregister_handler_with_context(&self.inner)
    }

    pub fn register_span_handler(&self, handler: fn(&Span)) -> Result<(), DispatchError> {
        self.span_registry.register(handler)
    }

    pub fn unregister_span_handler(&self, handler: fn(&Span)) -> Result<(), DispatchError> {
        self.span_registry.unregister(handler)
    }

    pub fn register_span_handler_with_context<C: Send + Sync + 'static>(
        &self,
        handler: fn(&Span, &C),
        ctx: Arc<C>,
    ) -> Result<(), DispatchError> {
        self.span_registry.register_with_context(handler, ctx)
    }

    pub fn unregister_span_handler_with_context<C: Send + Sync + 'static>(
        &self,
        ctx: &Arc<C>,
    ) -> Result<(), DispatchError> {
        self.span_registry.unregister_with_context(ctx)
    }

    /// Current number of threads with at least one open or closed span seen
    /// so far (ambient introspection, for tests/diagnostics).
    #[must_use]
    pub fn tracked_thread_count(&self) -> usize {
        self.inner.table.lock().unwrap().len()
    }

    /// Detaches from `receiver`, then discards any still-open spans (no
    /// flush-as-spans on shutdown) and drops the span dispatcher.
    pub fn shutdown(self, receiver: &Receiver) {
        let _ = self.detach(receiver);
        self.inner.table.lock().unwrap().clear();
    }

    fn handle_event(event: &Event, inner: &AdapterInner) {
        if event.label_is_empty() {
            return;
        }

        let completed = {
            let mut table = inner.table.lock().unwrap();
            let Some(stack) = table.get_or_insert(event.thread_id) else {
                return;
            };
            match stack.top_label() {
                Some(top) if top == event.label_bytes() => {
                    let popped = stack.pop().expect("top_label implies a populated stack");
                    debug_assert_span_ordered!(popped.start_timestamp, event.timestamp);
                    Some(Span::new(
                        popped.full_path,
                        popped.start_timestamp,
                        event.timestamp,
                        event.thread_id,
                    ))
                }
                _ => {
                    push_begin(stack, event);
                    None
                }
            }
        }; // lock released before dispatching, to avoid lock inversion with span handlers

        if let Some(span) = completed {
            inner.span_dispatcher.emit(&span);
        }
    }
}

fn push_begin(stack: &mut ShadowStack, event: &Event) {
    let parent_full_path = stack.top_full_path().copied();
    let full_path = build_full_path(parent_full_path.as_ref(), &event.label());
    // A full stack silently drops the begin; the matching end event will
    // then find no matching top-of-stack and push again, which is itself
    // discarded the same way. This mirrors the original's unconditional
    // `if (ts->stack_top < MAX_STACK_DEPTH - 1)` guard.
    stack.push(*event.label_bytes(), full_path, event.timestamp);
}

fn build_full_path(parent: Option<&[u8; PATH_MAX]>, label: &str) -> [u8; PATH_MAX] {
    let mut combined = String::with_capacity(PATH_MAX);
    if let Some(parent_bytes) = parent {
        let end = parent_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(parent_bytes.len());
        combined.push_str(&String::from_utf8_lossy(&parent_bytes[..end]));
        combined.push(';');
    }
    combined.push_str(label);

    let mut buf = [0u8; PATH_MAX];
    let max_len = PATH_MAX - 1;
    let mut end = combined.len().min(max_len);
    while end > 0 && !combined.is_char_boundary(end) {
        end -= 1;
    }
    buf[..end].copy_from_slice(&combined.as_bytes()[..end]);
    buf
}


#[cfg(test)]
mod tests {
    use super::*;

    fn label_bytes(s: &str) -> [u8; tracering_core::event::LABEL_MAX] {
        let mut b = [0u8; tracering_core::event::LABEL_MAX];
        b[..s.len()].copy_from_slice(s.as_bytes());
        b
    }

    #[test]
    fn build_full_path_joins_with_semicolon() {
        let parent = build_full_path(None, "outer");
        let joined = build_full_path(Some(&parent), "inner");
        let end = joined.iter().position(|&b| b == 0).unwrap();
        assert_eq!(std::str::from_utf8(&joined[..end]).unwrap(), "outer;inner");
    }

    #[test]
    fn build_full_path_truncates_on_utf8_boundary() {
        let parent_label = "p".repeat(250);
        let parent = build_full_path(None, &parent_label);
        let joined = build_full_path(Some(&parent), "é-tail");
        // Must not panic and must remain valid UTF-8 up to the nul.
        let end = joined.iter().position(|&b| b == 0).unwrap_or(joined.len());
        assert!(std::str::from_utf8(&joined[..end]).is_ok());
        assert!(end <= PATH_MAX - 1);
    }

    #[test]
    fn matched_begin_end_pair_produces_one_span() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static SPANS: AtomicUsize = AtomicUsize::new(0);
        fn on_span(_s: &Span) {
            SPANS.fetch_add(1, Ordering::SeqCst);
        }

        let adapter = StackTraceAdapter::init(AdapterConfig::default()).unwrap();
        adapter.register_span_handler(on_span).unwrap();

        let inner = Arc::clone(&adapter.inner);
        let begin = Event::new(100, 1, "work");
        StackTraceAdapter::handle_event(&begin, &inner);
        assert_eq!(adapter.tracked_thread_count(), 1);

        let end = Event::new(150, 1, "work");
        StackTraceAdapter::handle_event(&end, &inner);

        assert_eq!(SPANS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mismatched_label_pushes_nested_span() {
        let adapter = StackTraceAdapter::init(AdapterConfig::default()).unwrap();
        let inner = Arc::clone(&adapter.inner);

        StackTraceAdapter::handle_event(&Event::new(0, 1, "outer"), &inner);
        StackTraceAdapter::handle_event(&Event::new(1, 1, "inner"), &inner);

        let table = inner.table.lock().unwrap();
        // Both are still open (pushed, not matched), so the thread's stack
        // holds two entries.
        drop(table);
        assert_eq!(adapter.tracked_thread_count(), 1);
    }

    #[test]
    fn empty_label_is_ignored() {
        let adapter = StackTraceAdapter::init(AdapterConfig::default()).unwrap();
        let inner = Arc::clone(&adapter.inner);
        StackTraceAdapter::handle_event(&Event::new(0, 1, ""), &inner);
        assert_eq!(adapter.tracked_thread_count(), 0);
    }

    #[test]
    fn depth_boundary_drops_begin_past_stack_depth() {
        let adapter =
            StackTraceAdapter::init(AdapterConfig::default().with_stack_depth(1)).unwrap();
        let inner = Arc::clone(&adapter.inner);

        StackTraceAdapter::handle_event(&Event::new(0, 1, "a"), &inner);
        StackTraceAdapter::handle_event(&Event::new(1, 1, "b"), &inner);

        let mut table = inner.table.lock().unwrap();
        let stack = table.get_or_insert(1).unwrap();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top_label().unwrap(), &label_bytes("a"));
    }
}
