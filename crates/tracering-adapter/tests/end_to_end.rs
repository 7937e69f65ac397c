use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use tracering_adapter::{AdapterConfig, StackTraceAdapter};
use tracering_core::{unlink, Config, Emitter};
use tracering_receiver::{Receiver, ReceiverConfig};

static NEXT_ID: AtomicU32 = AtomicU32::new(200);

fn unique_shm_name(tag: &str) -> &'static str {
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    let name = format!("/tracering_adapter_it_{tag}_{}_{id}", std::process::id());
    Box::leak(name.into_boxed_str())
}

static SEEN_PATHS: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn record_span(span: &tracering_adapter::Span) {
    SEEN_PATHS.lock().unwrap().push(span.path().into_owned());
}

#[test]
fn nested_begin_end_pairs_produce_joined_paths() {
    SEEN_PATHS.lock().unwrap().clear();

    let name = unique_shm_name("nested");
    let receiver = Receiver::init(ReceiverConfig::low_latency().with_shm_name(name)).unwrap();
    let adapter = StackTraceAdapter::init(AdapterConfig::default()).unwrap();
    adapter.attach(&receiver).unwrap();
    adapter.register_span_handler(record_span).unwrap();

    let emitter = Emitter::init(Config::default().with_shm_name(name)).unwrap();
    emitter.publish(tracering_core::Event::new(0, 1, "outer"));
    emitter.publish(tracering_core::Event::new(1, 1, "inner"));
    emitter.publish(tracering_core::Event::new(2, 1, "inner"));
    emitter.publish(tracering_core::Event::new(3, 1, "outer"));

    receiver.poll();

    let paths = SEEN_PATHS.lock().unwrap().clone();
    assert_eq!(paths, vec!["outer;inner", "outer"]);

    let _ = unlink(name);
}

#[test]
fn unmatched_begin_is_discarded_on_shutdown_not_flushed() {
    static SPAN_COUNT: AtomicUsize = AtomicUsize::new(0);
    fn count_span(_s: &tracering_adapter::Span) {
        SPAN_COUNT.fetch_add(1, Ordering::SeqCst);
    }

    let name = unique_shm_name("unmatched");
    let receiver = Receiver::init(ReceiverConfig::low_latency().with_shm_name(name)).unwrap();
    let adapter = StackTraceAdapter::init(AdapterConfig::default()).unwrap();
    adapter.attach(&receiver).unwrap();
    adapter.register_span_handler(count_span).unwrap();

    let emitter = Emitter::init(Config::default().with_shm_name(name)).unwrap();
    emitter.publish(tracering_core::Event::new(0, 1, "never_closed"));
    receiver.poll();

    adapter.shutdown(&receiver);
    assert_eq!(SPAN_COUNT.load(Ordering::SeqCst), 0);

    let _ = unlink(name);
}
