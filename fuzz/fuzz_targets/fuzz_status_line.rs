//! Fuzz target: `parse_status`
//!
//! Any byte string must classify as success, a device code or a malformed
//! response without panicking; device codes must echo the two hex digits.
//!
//! cargo fuzz run fuzz_status_line

#![no_main]

use fieldlogger::controller::link::parse_status;
use fieldlogger::error::ControllerError;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match parse_status(data) {
        Ok(()) => assert!(data.starts_with(b"!00")),
        Err(ControllerError::Device(code)) => {
            assert_eq!(data[0], b'!');
            let text = core::str::from_utf8(&data[1..3]).expect("hex digits are ASCII");
            assert_eq!(u8::from_str_radix(text, 16).ok(), Some(code));
            assert_ne!(code, 0);
        }
        Err(ControllerError::MalformedResponse) => {}
        Err(other) => panic!("unexpected classification {other:?}"),
    }
});
