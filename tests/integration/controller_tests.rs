//! Storage-controller session scenarios against the simulated controller.

use fieldlogger::adapters::sim::SimBoard;
use fieldlogger::app::ports::PowerRail;
use fieldlogger::config::ControllerConfig;
use fieldlogger::controller::files::LogicalFile;
use fieldlogger::controller::{ControllerState, StorageController};
use fieldlogger::error::{ControllerError, FileFamily};
use fieldlogger::events::SharedState;
use fieldlogger::scheduler::Scheduler;
use fieldlogger::timestamp::DateTime;

fn controller(shared: &SharedState) -> StorageController<'_> {
    StorageController::new(Scheduler::new(shared), ControllerConfig::default())
}

const NOW: DateTime = DateTime::new(2024, 5, 17, 8, 30, 0);

// ── Power-up ──────────────────────────────────────────────────

#[test]
fn power_up_runs_the_full_handshake() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    let mut ctl = controller(&shared);
    ctl.power_up(&mut board, &NOW).unwrap();

    let sent: Vec<&str> = board.controller.commands().iter().map(String::as_str).collect();
    assert_eq!(sent[..5], ["V", "B 1EF4", "V", "J", "U"]);
    assert!(sent.contains(&"T S"));
    assert_eq!(board.controller.clock(), Some(NOW.fat_timestamp()));
    assert!(board.controller.is_mounted());
    assert!(board.rail(PowerRail::RemovableMedia));
    assert!(board.error_log().is_empty());
}

#[test]
fn wrong_version_never_switches_baud() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    board.controller.set_wrong_version(true);
    let mut ctl = controller(&shared);

    let err = ctl.power_up(&mut board, &NOW).unwrap_err();
    assert_eq!(err, ControllerError::BadVersion);
    assert!(!board.controller.sent("B 1EF4"));
    assert_eq!(ctl.state(), ControllerState::PoweredDown);
    assert_eq!(board.serial_baud(), None);
    assert_eq!(board.error_log().as_slice(), &[ControllerError::BadVersion.code()]);
}

#[test]
fn mount_is_retried_then_fails() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    board.controller.set_refuse_mount(true);
    let mut ctl = controller(&shared);

    let err = ctl.power_up(&mut board, &NOW).unwrap_err();
    assert_eq!(err, ControllerError::MountFailed);
    let mounts = board.controller.commands().iter().filter(|c| *c == "U").count();
    assert_eq!(mounts, ControllerConfig::default().mount_attempts as usize);
    assert!(!board.rail(PowerRail::StorageController));
    assert!(!board.rail(PowerRail::RemovableMedia));
    // device code for each refused mount, then the session failure
    let log = board.error_log();
    assert_eq!(log.last(), Some(&ControllerError::MountFailed.code()));
    assert!(log.contains(&0x030B));
}

// ── Files ─────────────────────────────────────────────────────

#[test]
fn buffered_text_lands_in_the_file() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    let mut ctl = controller(&shared);
    ctl.power_up(&mut board, &NOW).unwrap();

    ctl.open_file(&mut board, LogicalFile::Sensor2).unwrap();
    ctl.append_tx(format_args!("first {}\r\n", 1)).unwrap();
    ctl.append_tx(format_args!("second\r\n")).unwrap();
    ctl.write_buffer_to_file(&mut board, LogicalFile::Sensor2).unwrap();
    assert_eq!(ctl.tx_len(), 0);
    ctl.close_file(&mut board, LogicalFile::Sensor2).unwrap();

    assert_eq!(board.controller.file("SENSOR_2.LOG"), Some("first 1\r\nsecond\r\n"));
    assert!(board.controller.sent("W 3>0011"));
    assert_eq!(board.controller.open_handles(), 0);
}

#[test]
fn write_ack_timeout_fails_and_leaves_file_open() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    let mut ctl = controller(&shared);
    ctl.power_up(&mut board, &NOW).unwrap();
    ctl.open_file(&mut board, LogicalFile::Sensor1).unwrap();

    board.controller.set_drop_write_ack(true);
    ctl.append_tx(format_args!("lost\r\n")).unwrap();
    let before = board.now_ms();
    let err = ctl
        .write_buffer_to_file(&mut board, LogicalFile::Sensor1)
        .unwrap_err();

    assert_eq!(err, ControllerError::AppendFailed(FileFamily::Log));
    assert!(board.now_ms() - before >= u64::from(ctl.config().timeouts.write_ack));
    assert!(ctl.is_open(LogicalFile::Sensor1));
    assert!(ctl.is_mounted());
    assert_eq!(board.controller.open_handles(), 1);
    assert_eq!(ctl.tx_len(), 0);

    // the caller still closes it
    board.controller.set_drop_write_ack(false);
    ctl.close_file(&mut board, LogicalFile::Sensor1).unwrap();
    assert_eq!(board.controller.open_handles(), 0);
}

#[test]
fn abort_closes_open_files_and_powers_down() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    let mut ctl = controller(&shared);
    ctl.power_up(&mut board, &NOW).unwrap();
    ctl.open_file(&mut board, LogicalFile::System).unwrap();
    ctl.open_file(&mut board, LogicalFile::Sensor1).unwrap();

    let err = ctl.abort_session(&mut board, ControllerError::AppendFailed(FileFamily::Log));
    assert_eq!(err.code(), 0x020C);
    assert!(board.controller.sent("C 0"));
    assert!(board.controller.sent("C 2"));
    assert_eq!(ctl.state(), ControllerState::PoweredDown);
    assert!(!board.controller.is_powered());
    assert_eq!(board.error_log().as_slice(), &[0x020C]);
}

#[test]
fn finish_session_powers_down_after_close_delay() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    let mut ctl = controller(&shared);
    ctl.power_up(&mut board, &NOW).unwrap();

    let before = board.now_ms();
    ctl.finish_session(&mut board);
    assert!(board.now_ms() - before >= u64::from(ctl.config().session_close_ms));
    assert_eq!(ctl.state(), ControllerState::PoweredDown);
    assert!(!board.rail(PowerRail::StorageController));
    assert_eq!(board.serial_baud(), None);
}

// ── Firmware update ───────────────────────────────────────────

#[test]
fn firmware_update_waits_for_final_status() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    let mut ctl = controller(&shared);

    ctl.update_firmware(&mut board).unwrap();
    assert!(board.controller.sent("X U"));
    // no baud switch in update mode
    assert!(!board.controller.sent("B 1EF4"));
    assert_eq!(ctl.state(), ControllerState::PoweredDown);
    assert!(board.error_log().is_empty());
}

#[test]
fn silent_controller_during_update_is_not_responding() {
    let shared = SharedState::new();
    let mut board = SimBoard::new(&shared);
    board.controller.set_silent(true);
    let mut ctl = controller(&shared);

    assert_eq!(
        ctl.update_firmware(&mut board),
        Err(ControllerError::NotResponding)
    );
    assert_eq!(board.error_log().as_slice(), &[0x0201]);
}
