//! Paged external EEPROM holding the circular log.
//!
//! Multi-byte writes must stay inside one physical page; the device wraps
//! within the page otherwise.  [`Eeprom::write`] splits a request at page
//! boundaries, drives the write-enable rail around each page write, and
//! waits the settle time before the next transaction.

use embedded_hal::delay::DelayNs;
use log::debug;

use super::Device;
use crate::app::ports::{BusHardware, PowerPort, PowerRail};
use crate::config::LoggerConfig;
use crate::error::{BusError, Peripheral};

pub const ADDRESS: u8 = 0x50;
pub const DEVICE: Device = Device::new(Peripheral::Eeprom, ADDRESS);
/// Bytes reachable with a two-byte word address.
pub const ADDRESS_SPACE: u32 = 0x1_0000;

#[derive(Debug, Clone, Copy)]
pub struct Eeprom {
    page_size: u16,
    settle_ms: u32,
}

impl Eeprom {
    pub const fn new(page_size: u16, settle_ms: u32) -> Self {
        Self {
            page_size,
            settle_ms,
        }
    }

    pub fn from_config(config: &LoggerConfig) -> Self {
        Self::new(config.eeprom_page_size, config.eeprom_settle_ms)
    }

    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    /// Write `data` at `address`, one page-aligned chunk per transaction.
    pub fn write<H: BusHardware + ?Sized>(
        &self,
        hw: &mut H,
        address: u16,
        data: &[u8],
    ) -> Result<(), BusError> {
        let mut at = address;
        let mut rest = data;
        while !rest.is_empty() {
            let room = usize::from(self.page_size - at % self.page_size);
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            self.write_page(hw, at, chunk)?;
            at = at.wrapping_add(chunk.len() as u16);
            rest = tail;
        }
        Ok(())
    }

    pub fn read<H: BusHardware + ?Sized>(
        &self,
        hw: &mut H,
        address: u16,
        out: &mut [u8],
    ) -> Result<(), BusError> {
        super::read(hw, DEVICE, &address.to_be_bytes(), out)
    }

    fn write_page<H: BusHardware + ?Sized>(
        &self,
        hw: &mut H,
        address: u16,
        chunk: &[u8],
    ) -> Result<(), BusError> {
        debug!("Eeprom: page write 0x{:04X}+{}", address, chunk.len());
        hw.set_rail(PowerRail::EepromWriteEnable, true);
        let result = super::write(hw, DEVICE, &address.to_be_bytes(), chunk);
        hw.set_rail(PowerRail::EepromWriteEnable, false);
        result?;
        hw.delay_ms(self.settle_ms);
        Ok(())
    }
}
