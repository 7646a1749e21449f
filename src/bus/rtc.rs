//! Real-time clock (PCF8563-style register map).
//!
//! Provides wall-clock time for log timestamps and the countdown timer that
//! raises the wake-alarm interrupt for slow channels.

use log::info;

use super::Device;
use crate::app::ports::BusHardware;
use crate::error::{BusError, Peripheral};
use crate::timestamp::{DateTime, bcd_to_bin, bin_to_bcd};

pub const ADDRESS: u8 = 0x51;
pub const DEVICE: Device = Device::new(Peripheral::Rtc, ADDRESS);

pub const REG_CONTROL_1: u8 = 0x00;
pub const REG_CONTROL_2: u8 = 0x01;
pub const REG_SECONDS: u8 = 0x02;
pub const REG_CLKOUT: u8 = 0x0D;
pub const REG_TIMER_CONTROL: u8 = 0x0E;
pub const REG_TIMER: u8 = 0x0F;

/// Clock integrity flag in the seconds register.
pub const VOLTAGE_LOW: u8 = 0x80;
/// Timer interrupt enable (control 2).
pub const TIMER_INTERRUPT_ENABLE: u8 = 0x01;
/// Timer flag (control 2).
pub const TIMER_FLAG: u8 = 0x04;
pub const TIMER_ENABLE: u8 = 0x80;
/// 1 Hz timer source.
pub const TIMER_SOURCE_SECONDS: u8 = 0x02;
/// 1/60 Hz timer source.
pub const TIMER_SOURCE_MINUTES: u8 = 0x03;

/// Clear control, clock-out and timer registers and the voltage-low flag.
pub fn init<H: BusHardware + ?Sized>(hw: &mut H) -> Result<(), BusError> {
    for reg in [REG_CONTROL_1, REG_CONTROL_2, REG_CLKOUT, REG_TIMER_CONTROL, REG_TIMER] {
        super::write(hw, DEVICE, &[reg], &[0x00])?;
    }
    let mut seconds = [0u8; 1];
    super::read(hw, DEVICE, &[REG_SECONDS], &mut seconds)?;
    if seconds[0] & VOLTAGE_LOW != 0 {
        info!("Rtc: clock integrity lost, time may be invalid");
    }
    super::write(hw, DEVICE, &[REG_SECONDS], &[seconds[0] & !VOLTAGE_LOW])
}

pub fn read_time<H: BusHardware + ?Sized>(hw: &mut H) -> Result<DateTime, BusError> {
    let mut raw = [0u8; 7];
    super::read(hw, DEVICE, &[REG_SECONDS], &mut raw)?;
    Ok(DateTime {
        second: bcd_to_bin(raw[0] & 0x7F),
        minute: bcd_to_bin(raw[1] & 0x7F),
        hour: bcd_to_bin(raw[2] & 0x3F),
        day: bcd_to_bin(raw[3] & 0x3F),
        // raw[4] is the weekday
        month: bcd_to_bin(raw[5] & 0x1F),
        year: 2000 + u16::from(bcd_to_bin(raw[6])),
    })
}

pub fn write_time<H: BusHardware + ?Sized>(hw: &mut H, time: &DateTime) -> Result<(), BusError> {
    let raw = [
        bin_to_bcd(time.second),
        bin_to_bcd(time.minute),
        bin_to_bcd(time.hour),
        bin_to_bcd(time.day),
        0,
        bin_to_bcd(time.month),
        bin_to_bcd((time.year.saturating_sub(2000) % 100) as u8),
    ];
    super::write(hw, DEVICE, &[REG_SECONDS], &raw)
}

/// Load the countdown timer with `minutes` and enable its interrupt.
pub fn start_alarm<H: BusHardware + ?Sized>(hw: &mut H, minutes: u8) -> Result<(), BusError> {
    super::write(hw, DEVICE, &[REG_TIMER], &[minutes])?;
    super::write(
        hw,
        DEVICE,
        &[REG_TIMER_CONTROL],
        &[TIMER_ENABLE | TIMER_SOURCE_MINUTES],
    )?;
    super::write(hw, DEVICE, &[REG_CONTROL_2], &[TIMER_INTERRUPT_ENABLE])
}

/// Whole periods left on the countdown timer.
pub fn read_alarm<H: BusHardware + ?Sized>(hw: &mut H) -> Result<u8, BusError> {
    let mut timer = [0u8; 1];
    super::read(hw, DEVICE, &[REG_TIMER], &mut timer)?;
    Ok(timer[0])
}

/// Stop the countdown timer and acknowledge its flag.
pub fn stop_alarm<H: BusHardware + ?Sized>(hw: &mut H) -> Result<(), BusError> {
    super::write(hw, DEVICE, &[REG_TIMER_CONTROL], &[0x00])?;
    super::write(hw, DEVICE, &[REG_CONTROL_2], &[0x00])
}
