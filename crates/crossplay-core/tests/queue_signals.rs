//! Integration tests for signals emitted from serial dispatch queues.

use std::sync::Arc;
use std::thread;

use crossplay_core::{Property, SerialQueue, Signal};
use parking_lot::Mutex;

struct Model {
    value: Property<u32>,
    changed: Signal<u32>,
}

#[test]
fn test_emissions_from_queue_keep_submission_order() {
    let queue = Arc::new(SerialQueue::new("model-queue").unwrap());
    let model = Arc::new(Model {
        value: Property::new(0),
        changed: Signal::new(),
    });
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_clone = seen.clone();
    model.changed.connect(move |v| seen_clone.lock().push(*v));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let q = queue.clone();
            let m = model.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    let m = m.clone();
                    q.submit(move || {
                        let next = m.value.get() + 1;
                        if m.value.set(next) {
                            m.changed.emit(next);
                        }
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    queue.submit_sync(|| ()).unwrap();

    // Serialized increments never skip or repeat a value.
    assert_eq!(*seen.lock(), (1..=40).collect::<Vec<_>>());
    assert!(queue.stop_and_join());
}

#[test]
fn test_unchanged_property_emits_nothing() {
    let queue = SerialQueue::new("quiet-queue").unwrap();
    let model = Arc::new(Model {
        value: Property::new(7),
        changed: Signal::new(),
    });
    let count = Arc::new(Mutex::new(0));

    let count_clone = count.clone();
    model.changed.connect(move |_| *count_clone.lock() += 1);

    let m = model.clone();
    queue
        .submit_sync(move || {
            if m.value.set(7) {
                m.changed.emit(7);
            }
        })
        .unwrap();

    assert_eq!(*count.lock(), 0);
    queue.stop_and_join();
}
