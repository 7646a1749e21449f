//! Two-wire bus transaction driver.
//!
//! Every transaction is a fixed sequence of steps, each checked against the
//! status the bus controller must report:
//!
//! ```text
//!  write:  START ─▶ SLA+W ─▶ reg… ─▶ data… ─▶ STOP
//!  read:   START ─▶ SLA+W ─▶ reg… ─▶ RSTART ─▶ SLA+R ─▶ data…(ACK) ─▶ last(NACK) ─▶ STOP
//! ```
//!
//! The first mismatch aborts: stop, disable the bus, drop the EEPROM
//! write-enable rail, append the error code to the error log, and return a
//! [`BusError`] naming peripheral and phase.  Partial writes are not rolled
//! back.
//!
//! The bus has a single owner at a time; nothing here arbitrates between
//! callers.

pub mod eeprom;
pub mod rtc;
pub mod thermometer;

use log::warn;

use crate::app::ports::{BusStatus, CellStorePort, PowerPort, PowerRail, TwoWirePort};
use crate::diagnostics;
use crate::error::{BusError, BusPhase, Direction, Peripheral};

/// An addressed device on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub peripheral: Peripheral,
    /// 7-bit bus address.
    pub address: u8,
}

impl Device {
    pub const fn new(peripheral: Peripheral, address: u8) -> Self {
        Self {
            peripheral,
            address,
        }
    }

    fn write_address(self) -> u8 {
        self.address << 1
    }

    fn read_address(self) -> u8 {
        (self.address << 1) | 0x01
    }
}

/// Write `register` (the device-internal address bytes) followed by `data`.
pub fn write<H>(hw: &mut H, device: Device, register: &[u8], data: &[u8]) -> Result<(), BusError>
where
    H: TwoWirePort + CellStorePort + PowerPort + ?Sized,
{
    write_steps(hw, device, register, data)
        .map_err(|phase| abort(hw, BusError::new(device.peripheral, Direction::Write, phase)))
}

/// Set the device pointer to `register`, then read `out.len()` bytes.
pub fn read<H>(hw: &mut H, device: Device, register: &[u8], out: &mut [u8]) -> Result<(), BusError>
where
    H: TwoWirePort + CellStorePort + PowerPort + ?Sized,
{
    read_steps(hw, device, register, out)
        .map_err(|phase| abort(hw, BusError::new(device.peripheral, Direction::Read, phase)))
}

fn expect(status: BusStatus, wanted: BusStatus, phase: BusPhase) -> Result<(), BusPhase> {
    if status == wanted { Ok(()) } else { Err(phase) }
}

fn write_steps<H: TwoWirePort + ?Sized>(
    hw: &mut H,
    device: Device,
    register: &[u8],
    data: &[u8],
) -> Result<(), BusPhase> {
    expect(hw.start(), BusStatus::START, BusPhase::StartNotSent)?;
    expect(
        hw.send(device.write_address()),
        BusStatus::ADDRESS_WRITE_ACK,
        BusPhase::AddressNotAcked,
    )?;
    for &byte in register.iter().chain(data) {
        expect(hw.send(byte), BusStatus::DATA_WRITE_ACK, BusPhase::DataNotAcked)?;
    }
    hw.stop();
    Ok(())
}

fn read_steps<H: TwoWirePort + ?Sized>(
    hw: &mut H,
    device: Device,
    register: &[u8],
    out: &mut [u8],
) -> Result<(), BusPhase> {
    expect(hw.start(), BusStatus::START, BusPhase::StartNotSent)?;
    expect(
        hw.send(device.write_address()),
        BusStatus::ADDRESS_WRITE_ACK,
        BusPhase::AddressNotAcked,
    )?;
    for &byte in register {
        expect(hw.send(byte), BusStatus::DATA_WRITE_ACK, BusPhase::DataNotAcked)?;
    }
    expect(hw.start(), BusStatus::REPEATED_START, BusPhase::StartNotSent)?;
    expect(
        hw.send(device.read_address()),
        BusStatus::ADDRESS_READ_ACK,
        BusPhase::RepeatedStartAddressNotAcked,
    )?;
    let last = out.len().saturating_sub(1);
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = hw.receive(i < last);
    }
    hw.stop();
    Ok(())
}

fn abort<H>(hw: &mut H, err: BusError) -> BusError
where
    H: TwoWirePort + CellStorePort + PowerPort + ?Sized,
{
    hw.stop();
    hw.disable();
    hw.set_rail(PowerRail::EepromWriteEnable, false);
    warn!("Bus: {}", err);
    diagnostics::record_error(hw, err.code());
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::SimBoard;
    use crate::diagnostics::ErrorLog;
    use crate::events::SharedState;

    const THERMO: Device = Device::new(Peripheral::Thermometer, thermometer::ADDRESS);

    #[test]
    fn missing_device_reports_address_phase_and_logs_code() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        board.bus.unplug(thermometer::ADDRESS);

        let err = write(&mut board, THERMO, &[0x01], &[0x00]).unwrap_err();
        assert_eq!(err.phase, BusPhase::AddressNotAcked);
        assert_eq!(err.direction, Direction::Write);
        assert_eq!(ErrorLog::default().entries(&board).as_slice(), &[0x0142]);
        assert!(board.bus.disabled_count() > 0);
    }

    #[test]
    fn read_failure_after_repeated_start_uses_read_phase() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        board.bus.fail_read_address(thermometer::ADDRESS);

        let mut out = [0u8; 2];
        let err = read(&mut board, THERMO, &[0x00], &mut out).unwrap_err();
        assert_eq!(err.code(), 0x0154);
    }

    #[test]
    fn stuck_bus_reports_start_not_sent() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        board.bus.hold_bus(true);

        let err = write(&mut board, THERMO, &[0x01], &[0x01]).unwrap_err();
        assert_eq!(err.phase, BusPhase::StartNotSent);
        assert_eq!(err.code(), 0x0141);
    }
}
