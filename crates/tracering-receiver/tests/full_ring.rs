use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tracering_core::{unlink, Config, Emitter, Event, SharedRing};
use tracering_receiver::{Receiver, ReceiverConfig};

static NEXT_ID: AtomicU32 = AtomicU32::new(100);

fn unique_shm_name(tag: &str) -> &'static str {
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    let name = format!("/tracering_it_{tag}_{}_{id}", std::process::id());
    Box::leak(name.into_boxed_str())
}

#[test]
fn draining_a_full_ring_recovers_capacity_for_more_publishes() {
    let name = unique_shm_name("full");
    let receiver = Receiver::init(ReceiverConfig::default().with_shm_name(name)).unwrap();
    let emitter = Emitter::init(Config::default().with_shm_name(name)).unwrap();

    static COUNT: AtomicUsize = AtomicUsize::new(0);
    fn handler(_e: &Event) {
        COUNT.fetch_add(1, Ordering::SeqCst);
    }
    receiver.register_handler(handler).unwrap();

    for i in 0..SharedRing::CAPACITY {
        assert!(emitter.publish(Event::new(i as u64, 0, "x")));
    }
    assert!(!emitter.publish(Event::new(0, 0, "overflow")));

    receiver.poll();
    assert_eq!(COUNT.load(Ordering::SeqCst), SharedRing::CAPACITY);

    assert!(emitter.publish(Event::new(1, 0, "after-drain")));
    receiver.poll();
    assert_eq!(COUNT.load(Ordering::SeqCst), SharedRing::CAPACITY + 1);

    let _ = unlink(name);
}
