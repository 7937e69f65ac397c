//! Creates the shared trace ring, attaches the stack-trace adapter, and
//! polls for events/spans until interrupted.

use std::thread::sleep;
use std::time::Duration;

use tracering_adapter::{AdapterConfig, Span, StackTraceAdapter};
use tracering_core::Event;
use tracering_receiver::{Receiver, ReceiverConfig};

fn on_event(event: &Event) {
    log::debug!("event: thread={} label={:?}", event.thread_id, event.label());
}

fn on_span(span: &Span) {
    println!(
        "span: {} ({} ns, thread {})",
        span.path(),
        span.duration_nanos(),
        span.thread_id
    );
}

fn main() {
    env_logger::init();

    let receiver = Receiver::init(ReceiverConfig::default()).expect("create shared trace ring");
    let adapter = StackTraceAdapter::init(AdapterConfig::default()).expect("create adapter");

    receiver.register_handler(on_event).expect("register event handler");
    adapter.attach(&receiver).expect("attach adapter to receiver");
    adapter.register_span_handler(on_span).expect("register span handler");

    log::info!("polling for events; run `emit` in another terminal");

    loop {
        receiver.poll();
        sleep(Duration::from_millis(10));
    }
}
