//! Log, fast-sample and settings exports to the simulated media.

use fieldlogger::app::events::AppEvent;
use fieldlogger::app::ports::PowerRail;
use fieldlogger::config::{LoggerConfig, load_channel_settings};
use fieldlogger::controller::ControllerState;
use fieldlogger::error::BusError;
use fieldlogger::events::SharedState;
use fieldlogger::log_store::{AppendOutcome, LogRecord};
use fieldlogger::sensors::SamplingMode;
use fieldlogger::timestamp::DateTime;

use crate::mock_hw::{Rig, analog, fast, pulse};

const AT: DateTime = DateTime::new(2024, 5, 17, 8, 30, 0);

fn record(channel_index: usize, kind: SamplingMode, magnitude: u16) -> LogRecord {
    LogRecord::new(AT.encode(), 21, 11_385, channel_index, kind, magnitude)
}

// ── Circular log ──────────────────────────────────────────────

#[test]
fn three_channel_one_records_scan_and_export_in_order() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    let store = *rig.app.store();

    for m in [10, 20, 30] {
        let out = store
            .append(&mut rig.board, &record(0, SamplingMode::Pulse, m), |_| false)
            .unwrap();
        assert!(matches!(out, AppendOutcome::Stored { .. }));
    }
    let mut seen = Vec::new();
    store
        .scan(&mut rig.board, |_, _, r| {
            seen.push((r.channel(), r.magnitude()));
            Ok::<_, BusError>(())
        })
        .unwrap();
    assert_eq!(seen, vec![(1, 10), (1, 20), (1, 30)]);

    rig.board.set_enclosure_open(true);
    rig.settle();

    assert!(rig.sink.contains(&AppEvent::ExportFinished { ok: true, records: 3 }));
    assert_eq!(
        rig.file_lines("SENSOR_1.LOG"),
        vec![
            "17.05.24 - 08:30:00 : 10",
            "17.05.24 - 08:30:00 : 20",
            "17.05.24 - 08:30:00 : 30",
        ]
    );
    assert_eq!(rig.file_lines("SYSTEM.LOG").len(), 3);
    assert_eq!(
        rig.file_lines("SYSTEM.LOG")[0],
        "17.05.24 - 08:30:00 : temp = 21, supply = 11385"
    );
    assert_eq!(store.read_index(&mut rig.board).unwrap(), 0);
    assert_eq!(rig.app.controller().state(), ControllerState::PoweredDown);
    assert!(!rig.board.rail(PowerRail::StorageController));
}

#[test]
fn export_drains_channel_pairs_in_two_turns() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    let store = *rig.app.store();
    for (ch, m) in [(2, 3), (0, 1), (3, 4), (1, 2), (2, 33)] {
        store
            .append(&mut rig.board, &record(ch, SamplingMode::Pulse, m), |_| false)
            .unwrap();
    }

    rig.board.set_enclosure_open(true);
    rig.settle();

    assert!(rig.sink.contains(&AppEvent::ExportFinished { ok: true, records: 5 }));
    assert_eq!(rig.file_lines("SENSOR_1.LOG").len(), 1);
    assert_eq!(rig.file_lines("SENSOR_2.LOG").len(), 1);
    assert_eq!(rig.file_lines("SENSOR_3.LOG").len(), 2);
    assert_eq!(rig.file_lines("SENSOR_4.LOG").len(), 1);
    assert_eq!(rig.file_lines("SYSTEM.LOG").len(), 5);

    // sensor 3 shares a handle with sensor 1 and is opened after it closed
    let cmds = rig.board.controller.commands();
    let pos = |c: &str| cmds.iter().position(|x| x == c).unwrap();
    assert!(pos("O 2A>SENSOR_1.LOG") < pos("C 2"));
    assert!(pos("C 2") < pos("O 2A>SENSOR_3.LOG"));
}

#[test]
fn export_skips_the_second_turn_without_its_channels() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    let store = *rig.app.store();
    for (ch, m) in [(0, 7), (1, 8), (0, 9)] {
        store
            .append(&mut rig.board, &record(ch, SamplingMode::Pulse, m), |_| false)
            .unwrap();
    }

    rig.board.set_enclosure_open(true);
    rig.settle();

    assert!(rig.sink.contains(&AppEvent::ExportFinished { ok: true, records: 3 }));
    assert_eq!(rig.file_lines("SENSOR_1.LOG").len(), 2);
    assert_eq!(rig.file_lines("SENSOR_2.LOG").len(), 1);
    let cmds = rig.board.controller.commands();
    assert!(!cmds.iter().any(|c| c.contains("SENSOR_3") || c.contains("SENSOR_4")));
    assert!(rig.file("SENSOR_3.LOG").is_none());
    assert!(rig.file("SENSOR_4.LOG").is_none());
}

#[test]
fn export_of_empty_log_leaves_controller_off() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    rig.board.set_enclosure_open(true);
    rig.settle();
    assert!(rig.sink.contains(&AppEvent::ExportFinished { ok: true, records: 0 }));
    assert_eq!(rig.board.controller.power_cycles(), 0);
}

#[test]
fn failed_export_keeps_the_log() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    let store = *rig.app.store();
    store
        .append(&mut rig.board, &record(1, SamplingMode::Analog, 500), |_| false)
        .unwrap();
    rig.board.controller.set_refuse_mount(true);

    rig.board.set_enclosure_open(true);
    rig.settle();

    assert!(rig.sink.contains(&AppEvent::ExportFinished { ok: false, records: 0 }));
    assert_eq!(store.read_index(&mut rig.board).unwrap(), 1);
    assert!(rig.board.error_log().contains(&0x0286));
    assert!(!rig.board.rail(PowerRail::StorageController));
}

#[test]
fn full_log_exports_before_the_next_record() {
    let shared = SharedState::new();
    let config = LoggerConfig {
        max_log_records: 2,
        ..LoggerConfig::default()
    };
    let mut rig = Rig::boot(&shared, config, &[(1, analog(60))]);
    rig.board.set_adc(1, 600);

    // three wake alarms, one minute apart
    rig.run_for(3 * 60_000 + 5_000);

    assert_eq!(rig.sink.committed(), vec![(2, 600), (2, 600), (2, 600)]);
    assert_eq!(rig.file_lines("SENSOR_2.LOG").len(), 2);
    assert_eq!(rig.app.store().read_index(&mut rig.board).unwrap(), 1);
}

#[test]
fn full_log_with_dead_controller_drops_the_record() {
    let shared = SharedState::new();
    let config = LoggerConfig {
        max_log_records: 1,
        ..LoggerConfig::default()
    };
    let mut rig = Rig::boot(&shared, config, &[(0, pulse(60))]);
    rig.board.controller.set_silent(true);

    rig.board.send_pulses(3, 60, 60);
    rig.run_for(62_000);
    assert_eq!(rig.sink.committed(), vec![(1, 3)]);

    rig.board.send_pulses(2, 60, 60);
    rig.run_for(62_000);
    assert!(rig.sink.contains(&AppEvent::RecordDropped { channel: 1 }));
    // not committed, so not consumed
    let pending = shared.with_sensors(|b| b.pulse_count());
    assert_eq!(pending, 2);
    let log = rig.board.error_log();
    assert!(log.contains(&0x0201));
    assert!(log.contains(&0x0286));
}

// ── Fast samples ──────────────────────────────────────────────

#[test]
fn ready_fast_half_is_appended_to_csv() {
    let shared = SharedState::new();
    // 0 bar at the bottom of the loop range
    let mut rig = Rig::boot_with(&shared, LoggerConfig::default(), &[(2, fast(1))], |b| {
        b.set_adc(2, 197);
    });

    rig.run_for(20_000);

    assert!(rig.sink.contains(&AppEvent::FastExportFinished { channel: 3, ok: true }));
    let lines = rig.file_lines("S_FAST.CSV");
    assert_eq!(lines.len(), 16);
    let first: Vec<&str> = lines[0].split(';').collect();
    assert_eq!(first.len(), 4);
    assert_eq!(first[2], "3");
    assert_eq!(first[3], "0.01");
    assert!(lines[1..].iter().all(|l| l == ";;0.01"));
    // the session stays up for the next half
    assert!(rig.app.controller().is_mounted());
}

#[test]
fn fast_export_mounts_again_after_a_failed_half() {
    let shared = SharedState::new();
    let mut rig = Rig::boot_with(&shared, LoggerConfig::default(), &[(2, fast(1))], |b| {
        b.set_adc(2, 197);
    });
    rig.board.controller.set_silent(true);

    rig.run_for(24_000);
    assert!(rig.sink.contains(&AppEvent::FastExportFinished { channel: 3, ok: false }));
    assert!(rig.sink.error_codes().contains(&0x0286));
    assert!(!rig.app.controller().is_mounted());
    assert!(!rig.board.controller.sent("U"));
    let cycles = rig.board.controller.power_cycles();

    rig.board.controller.set_silent(false);
    rig.run_for(16_000);

    assert!(rig.sink.contains(&AppEvent::FastExportFinished { channel: 3, ok: true }));
    assert!(rig.board.controller.power_cycles() > cycles);
    assert!(rig.board.controller.sent("U"));
    assert!(rig.app.controller().is_mounted());
    assert_eq!(rig.file_lines("S_FAST.CSV").len(), 16);
}

// ── Settings report ───────────────────────────────────────────

#[test]
fn settings_change_is_persisted_and_reported() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    let Rig { board, app, sink } = &mut rig;

    app.apply_channel_settings(board, sink, 1, analog(90)).unwrap();

    assert!(sink.contains(&AppEvent::SettingsExported { ok: true }));
    assert_eq!(load_channel_settings(&*board)[1], analog(90));
    let report = board.controller.file("SSETTING.LOG").unwrap();
    assert!(report.starts_with("-->> sensorsettings changed : "));
    assert!(report.contains("sensor 2:\r\n  status      = enabled\r\n  type        = 4-20mA\r\n"));
    assert!(report.contains("  interval    = 00:01:30\r\n  multifactor = 1.000\r\n"));
    assert!(report.contains("sensor 4:\r\n  status      = disabled"));
    assert!(report.ends_with("\r\n\r\n\r\n"));
    assert_eq!(app.controller().state(), ControllerState::PoweredDown);
}

#[test]
fn unknown_channel_is_rejected() {
    let shared = SharedState::new();
    let mut rig = Rig::boot(&shared, LoggerConfig::default(), &[]);
    let Rig { board, app, sink } = &mut rig;
    assert!(app.apply_channel_settings(board, sink, 4, analog(60)).is_err());
    assert!(board.controller.file("SSETTING.LOG").is_none());
}
