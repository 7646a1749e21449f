//! Bulk exports to the removable media.
//!
//! - [`export_log`] drains the circular log into the per-channel files and
//!   `SYSTEM.LOG`, then resets the log once the session closed cleanly.
//! - [`export_fast_samples`] appends one ready fast-sample half to
//!   `S_FAST.CSV` and keeps the session mounted for the next half.
//! - [`export_settings`] appends a channel-settings report to
//!   `SSETTING.LOG`.
//!
//! Each text line is formatted into the controller's transmit buffer and
//! written with one `W` request.

use core::fmt::{self, Write as _};

use log::{info, warn};

use super::StorageController;
use super::files::{EXPORT_TURNS, LogicalFile, export_turn};
use crate::app::ports::{BusHardware, ControllerHardware};
use crate::diagnostics::record_error;
use crate::error::{ControllerError, Error};
use crate::log_store::{LogRecord, LogStore};
use crate::sensors::{CHANNEL_COUNT, ChannelSettings, FAST_BUFFER_LEN, SamplingMode, pressure_bar};
use crate::timestamp::{DateTime, Duration};

/// Power up unless a session is already mounted.
fn ensure_session<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    now: &DateTime,
) -> Result<(), ControllerError> {
    if ctl.is_mounted() {
        return Ok(());
    }
    ctl.power_up(hw, now).map_err(|_| {
        record_error(hw, ControllerError::InitFailed.code());
        ControllerError::InitFailed
    })
}

/// Give up on the session after `error`.  Controller errors are recorded
/// by [`StorageController::abort_session`]; bus errors were already
/// recorded by the bus driver.
fn abandon<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    error: Error,
) -> Error {
    match error {
        Error::Controller(e) => {
            ctl.abort_session(hw, e);
        }
        _ => {
            ctl.close_all(hw);
            ctl.power_down(hw);
        }
    }
    error
}

/// Format into the transmit buffer and write it to `file`.  An empty
/// buffer is flushed first if the text does not fit.
fn write_line<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    file: LogicalFile,
    args: fmt::Arguments<'_>,
) -> Result<(), ControllerError> {
    if ctl.append_tx(args).is_err() {
        ctl.write_buffer_to_file(hw, file)?;
        ctl.append_tx(args)?;
    }
    ctl.write_buffer_to_file(hw, file)
}

/// Measurement column of a sensor file line.
struct Measurement(LogRecord);

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0.kind(), self.0.magnitude()) {
            (Some(SamplingMode::Pulse), n) => write!(f, "{n}"),
            (_, 0) => f.write_str("0"),
            (_, raw) => write!(f, "{:.2}", pressure_bar(raw)),
        }
    }
}

/// One fast sample in the CSV block.
struct Pressure(u16);

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("0")
        } else {
            write!(f, "{:.2}", pressure_bar(self.0))
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Circular log
// ═══════════════════════════════════════════════════════════════

/// Export every committed record.  Returns the number of records exported;
/// the log is reset only after all files closed and the session ended.
pub fn export_log<H>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    store: &LogStore,
    now: &DateTime,
) -> Result<u16, Error>
where
    H: BusHardware + ControllerHardware + ?Sized,
{
    let count = store.read_index(hw)?;
    if count == 0 {
        info!("Export: log empty");
        return Ok(0);
    }
    info!("Export: {} records", count);
    ensure_session(ctl, hw, now)?;

    match drain(ctl, hw, store) {
        Ok(n) => {
            ctl.finish_session(hw);
            store.reset(hw)?;
            info!("Export: done ({} records)", n);
            Ok(n)
        }
        Err(e) => {
            warn!("Export: failed ({})", e);
            Err(abandon(ctl, hw, e))
        }
    }
}

fn drain<H>(ctl: &mut StorageController<'_>, hw: &mut H, store: &LogStore) -> Result<u16, Error>
where
    H: BusHardware + ControllerHardware + ?Sized,
{
    ctl.open_file(hw, LogicalFile::System)?;

    let mut wanted = [false; EXPORT_TURNS.len()];
    wanted[0] = true;
    let mut exported = 0u16;
    for (turn, files) in EXPORT_TURNS.iter().enumerate() {
        if !wanted[turn] {
            continue;
        }
        for &file in files {
            ctl.open_file(hw, file)?;
        }
        store.scan(hw, |hw, _, record| {
            let Some(record_turn) = export_turn(record.channel_index()) else {
                return Ok(());
            };
            if record_turn != turn {
                if record_turn > turn {
                    wanted[record_turn] = true;
                }
                return Ok(());
            }
            export_record(ctl, hw, &record)?;
            exported += 1;
            Ok::<_, Error>(())
        })?;
        for &file in files {
            ctl.close_file(hw, file)?;
        }
    }

    ctl.close_file(hw, LogicalFile::System)?;
    Ok(exported)
}

fn export_record<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    record: &LogRecord,
) -> Result<(), ControllerError> {
    let Some(file) = LogicalFile::for_channel(record.channel_index()) else {
        return Ok(());
    };
    let at = DateTime::decode(record.timestamp);
    write_line(
        ctl,
        hw,
        file,
        format_args!("{} - {} : {}\r\n", at.date(), at.time(), Measurement(*record)),
    )?;
    write_line(
        ctl,
        hw,
        LogicalFile::System,
        format_args!(
            "{} - {} : temp = {}, supply = {}\r\n",
            at.date(),
            at.time(),
            record.board_temp,
            record.supply_mv
        ),
    )
}

// ═══════════════════════════════════════════════════════════════
//  Fast samples
// ═══════════════════════════════════════════════════════════════

/// Append one ready half of fast channel `index` to `S_FAST.CSV`.  The
/// session stays mounted on success and is torn down on failure.
pub fn export_fast_samples<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    index: usize,
    samples: &[u16; FAST_BUFFER_LEN],
    now: &DateTime,
) -> Result<(), Error> {
    ensure_session(ctl, hw, now)?;
    let result = write_fast_block(ctl, hw, index, samples, now);
    result.map_err(|e| abandon(ctl, hw, e.into()))
}

fn write_fast_block<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    index: usize,
    samples: &[u16; FAST_BUFFER_LEN],
    now: &DateTime,
) -> Result<(), ControllerError> {
    let file = LogicalFile::FastSamples;
    ctl.open_file(hw, file)?;
    ctl.append_tx(format_args!("{};{};{};", now.date(), now.time(), index + 1))?;
    for (i, &raw) in samples.iter().enumerate() {
        let sep = if i == 0 { "" } else { ";;" };
        let mut line: heapless::String<24> = heapless::String::new();
        let _ = write!(line, "{sep}{}\r\n", Pressure(raw));
        if ctl.append_tx(format_args!("{line}")).is_err() {
            ctl.write_buffer_to_file(hw, file)?;
            ctl.append_tx(format_args!("{line}"))?;
        }
    }
    ctl.write_buffer_to_file(hw, file)?;
    ctl.close_file(hw, file)
}

// ═══════════════════════════════════════════════════════════════
//  Settings report
// ═══════════════════════════════════════════════════════════════

/// Append a report of `settings` to `SSETTING.LOG` and end the session.
pub fn export_settings<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    settings: &[ChannelSettings; CHANNEL_COUNT],
    now: &DateTime,
) -> Result<(), Error> {
    ensure_session(ctl, hw, now)?;
    match write_settings(ctl, hw, settings, now) {
        Ok(()) => {
            ctl.finish_session(hw);
            info!("Export: settings report written");
            Ok(())
        }
        Err(e) => Err(abandon(ctl, hw, e.into())),
    }
}

fn write_settings<H: ControllerHardware + ?Sized>(
    ctl: &mut StorageController<'_>,
    hw: &mut H,
    settings: &[ChannelSettings; CHANNEL_COUNT],
    now: &DateTime,
) -> Result<(), ControllerError> {
    let file = LogicalFile::Settings;
    ctl.open_file(hw, file)?;
    write_line(
        ctl,
        hw,
        file,
        format_args!("-->> sensorsettings changed : {} - {}\r\n\r\n", now.date(), now.time()),
    )?;
    for (i, s) in settings.iter().enumerate() {
        let status = if s.enabled { "enabled" } else { "disabled" };
        write_line(
            ctl,
            hw,
            file,
            format_args!(
                "sensor {}:\r\n  status      = {status}\r\n  type        = {}\r\n",
                i + 1,
                s.mode.label()
            ),
        )?;
        let trailer = if i + 1 == CHANNEL_COUNT { "\r\n\r\n\r\n" } else { "\r\n" };
        write_line(
            ctl,
            hw,
            file,
            format_args!(
                "  unit        = {}\r\n  interval    = {}\r\n  multifactor = {:.3}\r\n{trailer}",
                s.unit.label(),
                Duration(s.interval_secs),
                s.multiply_factor
            ),
        )?;
    }
    ctl.close_file(hw, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: SamplingMode, magnitude: u16) -> LogRecord {
        LogRecord::new(0, 20, 3300, 0, kind, magnitude)
    }

    #[test]
    fn measurement_text() {
        assert_eq!(Measurement(record(SamplingMode::Pulse, 42)).to_string(), "42");
        assert_eq!(Measurement(record(SamplingMode::Analog, 0)).to_string(), "0");
        // 4 mA ≈ 0 bar at the bottom of the loop range
        assert_eq!(Measurement(record(SamplingMode::Analog, 197)).to_string(), "0.01");
        assert_eq!(Pressure(0).to_string(), "0");
        assert_eq!(Pressure(590).to_string(), "10.00");
    }
}
