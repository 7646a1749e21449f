//! Foreground dispatcher scenarios: boot, wake alarms, pulses, keys.

use fieldlogger::adapters::sim::SimBoard;
use fieldlogger::app::events::AppEvent;
use fieldlogger::bus::eeprom;
use fieldlogger::config::LoggerConfig;
use fieldlogger::diagnostics::{ErrorLog, record_error};
use fieldlogger::events::SharedState;

use crate::mock_hw::{Rig, analog, pulse};

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn boot_reports_stored_errors() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    ErrorLog::default().init(&mut board);
    record_error(&mut board, 0x0201);
    record_error(&mut board, 0x0286);
    board.set_enclosure_open(true);

    let rig = Rig::boot_board(&shared, LoggerConfig::default(), board);
    assert!(rig.sink.contains(&AppEvent::Started { error_log_len: 2 }));
}

#[test]
fn reset_with_closed_enclosure_is_logged() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    board.set_reset_cause(0x08);

    let rig = Rig::boot_board(&shared, LoggerConfig::default(), board);
    assert!(rig.sink.contains(&AppEvent::ErrorRecorded(0x9908)));
    assert_eq!(rig.board.error_log().as_slice(), &[0x9908]);
}

#[test]
fn reset_with_open_enclosure_is_not_logged() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    board.set_reset_cause(0x08);
    board.set_enclosure_open(true);

    let rig = Rig::boot_board(&shared, LoggerConfig::default(), board);
    assert!(rig.sink.error_codes().is_empty());
    assert!(rig.board.error_log().is_empty());
}

#[test]
fn boot_reads_clock_and_board_temperature() {
    let shared = SharedState::new();
    let rig = Rig::boot_with(&shared, LoggerConfig::default(), &[], |b| {
        b.bus.set_temperature(-4);
    });
    assert_eq!(rig.app.board_temp(), -4);
    assert_eq!(rig.app.now().year, 2024);
}

// ── Slow channels ─────────────────────────────────────────────

#[test]
fn analog_channel_commits_on_wake_alarm() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(1, analog(60))]);
    rig.board.set_adc(1, 412);

    rig.run_for(30_000);
    assert!(rig.sink.committed().is_empty());

    rig.run_for(32_000);
    assert_eq!(rig.sink.committed(), vec![(2, 412)]);
    assert_eq!(rig.app.store().read_index(&mut rig.board).unwrap(), 1);
    let last = shared.with_sensors(|b| b.last_measurements());
    assert_eq!(last[1], 412);
}

#[test]
fn two_minute_channel_skips_one_alarm_period() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(
        &shared,
        LoggerConfig::default(),
        &[(1, analog(60)), (3, analog(120))],
    );

    rig.run_for(4 * 60_000 + 5_000);

    let committed = rig.sink.committed();
    assert_eq!(committed.iter().filter(|(ch, _)| *ch == 2).count(), 4);
    assert_eq!(committed.iter().filter(|(ch, _)| *ch == 4).count(), 2);
}

#[test]
fn settings_change_keeps_the_running_alarm_period() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(1, analog(180))]);
    rig.board.set_adc(1, 300);
    rig.run_for(62_000);
    assert_eq!(rig.sink.committed(), vec![(2, 300)]);

    {
        let Rig { board, app, sink } = &mut rig;
        app.apply_channel_settings(board, sink, 2, analog(180)).unwrap();
    }
    // channel 2 is not measured again before its three minutes are up
    rig.run_for(100_000);
    assert_eq!(rig.sink.committed(), vec![(2, 300)]);

    rig.run_for(90_000);
    let committed = rig.sink.committed();
    assert_eq!(committed.iter().filter(|(ch, _)| *ch == 2).count(), 2);
    assert_eq!(committed.iter().filter(|(ch, _)| *ch == 3).count(), 1);
}

#[test]
fn no_slow_channel_means_no_alarm() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    rig.run_for(3 * 60_000);
    assert!(rig.sink.committed().is_empty());
    assert_eq!(rig.app.store().read_index(&mut rig.board).unwrap(), 0);
}

#[test]
fn unplugged_eeprom_fails_the_commit() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(1, analog(60))]);
    rig.board.bus.unplug(eeprom::ADDRESS);

    rig.run_for(62_000);

    assert!(rig.sink.committed().is_empty());
    let codes = rig.sink.error_codes();
    assert!(!codes.is_empty());
    assert!(codes.iter().all(|c| c & 0xFF60 == 0x0120));
    assert!(rig.board.error_log().contains(&codes[0]));
}

// ── Pulses ────────────────────────────────────────────────────

#[test]
fn pulses_are_consumed_when_committed() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(0, pulse(60))]);

    rig.board.send_pulses(5, 60, 60);
    assert_eq!(shared.with_sensors(|b| b.pulse_count()), 5);

    rig.run_for(62_000);
    assert_eq!(rig.sink.committed(), vec![(1, 5)]);
    assert_eq!(shared.with_sensors(|b| b.pulse_count()), 0);
}

#[test]
fn bouncing_contact_counts_once() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(0, pulse(60))]);
    // contact chatter, then the contact stays closed
    rig.board.send_pulses(4, 2, 3);
    rig.board.set_pulse_level(false);
    rig.board.advance_ms(80);
    rig.board.set_pulse_level(true);
    rig.board.advance_ms(100);
    assert_eq!(shared.with_sensors(|b| b.pulse_count()), 1);
}

#[test]
fn short_glitches_are_not_counted() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(0, pulse(60))]);
    rig.board.send_pulses(5, 1, 100);
    rig.settle();
    assert_eq!(shared.with_sensors(|b| b.pulse_count()), 0);
    assert!(!rig.sink.contains(&AppEvent::PulseIndicator(true)));
}

#[test]
fn counted_pulses_show_in_readings() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(0, pulse(60))]);
    rig.board.send_pulses(3, 60, 60);
    rig.settle();
    let last = rig.sink.events.iter().rev().find_map(|e| match e {
        AppEvent::Readings(r) => Some(*r),
        _ => None,
    });
    assert_eq!(last.map(|r| r[0]), Some(3));
}

#[test]
fn pulse_indicator_clears_after_its_hold_time() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(0, pulse(60))]);

    rig.board.send_pulses(1, 60, 60);
    rig.settle();
    assert!(rig.app.pulse_indicator());
    assert!(rig.sink.contains(&AppEvent::PulseIndicator(true)));
    assert!(rig.sink.count(|e| matches!(e, AppEvent::Readings(_))) >= 1);

    rig.run_for(u64::from(rig.app.config().pulse_indicator_ms) + 100);
    assert!(!rig.app.pulse_indicator());
    assert!(rig.sink.contains(&AppEvent::PulseIndicator(false)));
}

#[test]
fn pulses_ignored_on_analog_channel() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[(0, analog(60))]);
    rig.board.send_pulses(3, 60, 60);
    rig.settle();
    assert_eq!(shared.with_sensors(|b| b.pulse_count()), 0);
    assert!(!rig.sink.contains(&AppEvent::PulseIndicator(true)));
}

// ── Operator actions ──────────────────────────────────────────

#[test]
fn key_change_is_forwarded() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    rig.board.press_key();
    rig.settle();
    assert_eq!(rig.sink.count(|e| *e == AppEvent::KeyChanged), 1);
}

#[test]
fn firmware_update_is_reported() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    let Rig { board, app, sink } = &mut rig;

    app.update_firmware(board, sink).unwrap();
    assert!(sink.contains(&AppEvent::FirmwareUpdate { ok: true }));
    assert!(board.controller.sent("X U"));
}

#[test]
fn failed_firmware_update_is_reported() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    rig.board.controller.set_silent(true);
    let Rig { board, app, sink } = &mut rig;

    assert!(app.update_firmware(board, sink).is_err());
    assert!(sink.contains(&AppEvent::FirmwareUpdate { ok: false }));
    assert_eq!(sink.error_codes(), vec![0x0201]);
}
