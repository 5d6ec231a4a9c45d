extern crate duckie_detect;

use std::thread;
use std::time::Duration;
use duckie_detect::common::{Encoding, Frame, Header};
use duckie_detect::FrameStore;

fn frame(seq: u64) -> Frame {
    Frame::new(seq, 4, 2, Encoding::Rgb8, vec![0; 24], Header::default())
}

#[test]
fn take_after_puts_returns_latest() {
    let store = FrameStore::new();
    for seq in 1..=5 {
        store.put(frame(seq));
    }

    let taken = store.take_current().map(|f| f.seq());
    assert_eq!(taken, Some(5));
    assert!(store.take_current().is_none());

    let stats = store.stats();
    assert_eq!(stats.received, 5);
    assert_eq!(stats.superseded, 4);
    assert_eq!(stats.taken, 1);
}

#[test]
fn empty_store_returns_none_without_blocking() {
    let store = FrameStore::new();
    assert!(store.is_empty());
    assert!(store.take_current().is_none());
    assert!(!store.wait_for_frame(Duration::from_millis(10)));
}

#[test]
fn waiting_consumer_is_woken_by_put() {
    let store = FrameStore::new();
    let producer = store.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.put(frame(7));
    });

    assert!(store.wait_for_frame(Duration::from_secs(5)));
    assert_eq!(store.take_current().map(|f| f.seq()), Some(7));
    handle.join().unwrap();
}

#[test]
fn concurrent_producers_leave_a_single_frame() {
    let store = FrameStore::new();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    store.put(frame(t * 100 + i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(store.take_current().is_some());
    assert!(store.take_current().is_none());
    let stats = store.stats();
    assert_eq!(stats.received, 200);
    assert_eq!(stats.superseded, 199);
}
