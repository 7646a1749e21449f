//! Board temperature sensor (LM75-style).
//!
//! Kept in shutdown between readings; a reading wakes it, waits one
//! conversion, reads the integer degrees and shuts it down again.

use embedded_hal::delay::DelayNs;

use super::Device;
use crate::app::ports::BusHardware;
use crate::error::{BusError, Peripheral};

pub const ADDRESS: u8 = 0x48;
pub const DEVICE: Device = Device::new(Peripheral::Thermometer, ADDRESS);

pub const REG_TEMPERATURE: u8 = 0x00;
pub const REG_CONFIG: u8 = 0x01;
const CONFIG_RUN: u8 = 0x00;
const CONFIG_SHUTDOWN: u8 = 0x01;

/// Whole degrees Celsius.
pub fn read_celsius<H: BusHardware + ?Sized>(hw: &mut H, conversion_ms: u32) -> Result<i8, BusError> {
    super::write(hw, DEVICE, &[REG_CONFIG], &[CONFIG_RUN])?;
    hw.delay_ms(conversion_ms);
    let mut raw = [0u8; 2];
    super::read(hw, DEVICE, &[REG_TEMPERATURE], &mut raw)?;
    super::write(hw, DEVICE, &[REG_CONFIG], &[CONFIG_SHUTDOWN])?;
    Ok(raw[0] as i8)
}
