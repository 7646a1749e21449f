//! Fuzz target: `SerialRx::push`
//!
//! Feeds arbitrary bytes into the interrupt-side receive buffer and checks
//! that it never grows past its capacity, that every reported line is
//! terminator-free, and that the line count matches the completions
//! reported by `push`.
//!
//! cargo fuzz run fuzz_serial_rx

#![no_main]

use fieldlogger::controller::link::{RX_CAPACITY, SerialRx, TERMINATOR};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut rx = SerialRx::new();
    let mut completed = 0u8;
    for &b in data {
        if rx.push(b) {
            completed = completed.saturating_add(1);
        }
    }

    assert!(rx.len() <= RX_CAPACITY);
    assert_eq!(rx.message_count(), completed);
    for i in 0..rx.message_count() {
        let line = rx.message(i).expect("counted line must be readable");
        assert!(!line.is_empty(), "empty lines are dropped");
        assert!(!line.contains(&TERMINATOR));
    }
    assert!(rx.message(rx.message_count()).is_none());

    // A flushed buffer accepts input cleanly again.
    rx.flush();
    assert!(rx.is_empty() && !rx.overflowed());
    let _ = rx.push(b'!');
});
