//! Fuzz target: `LogRecord::decode`
//!
//! Every 9-byte pattern read back from the EEPROM must decode to a record
//! whose fields stay in range and which encodes back to the same bytes.
//!
//! cargo fuzz run fuzz_log_record

#![no_main]

use fieldlogger::log_store::{LogRecord, MAGNITUDE_MAX, RECORD_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = <[u8; RECORD_SIZE]>::try_from(data) else {
        return;
    };
    let record = LogRecord::decode(&raw);
    assert_eq!(record.encode(), raw);
    assert!(record.magnitude() <= MAGNITUDE_MAX);
    assert!((1..=4).contains(&record.channel()));
    assert!(record.channel_index() < 4);

    // Rebuilding from the decoded fields is stable when the kind is known.
    if let Some(kind) = record.kind() {
        let rebuilt = LogRecord::new(
            record.timestamp,
            record.board_temp,
            record.supply_mv,
            record.channel_index(),
            kind,
            record.magnitude(),
        );
        assert_eq!(rebuilt, record);
    }
});
