//! Simulated two-wire bus with the three logger peripherals attached.
//!
//! Follows the step-level status protocol of a TWI controller so the bus
//! driver sees the same status codes it would on hardware.  Faults are
//! injected per device address.

use crate::app::ports::BusStatus;
use crate::bus::{eeprom, rtc, thermometer};
use crate::timestamp::{bcd_to_bin, bin_to_bcd};

/// 512 kbit part.
pub const EEPROM_SIZE: usize = 0x1_0000;
pub const EEPROM_PAGE: usize = 128;

const RTC_REGISTERS: usize = 16;
const THERMO_SHUTDOWN: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    /// No start condition issued.
    Idle,
    /// Start sent, waiting for the address byte.
    Address,
    Write { device: u8, index: usize },
    Read { device: u8 },
    /// Addressed device did not answer; everything until stop is ignored.
    Dead,
}

pub struct SimBus {
    transfer: Transfer,
    /// A start (not a stop) was issued last, so the next start is repeated.
    in_transaction: bool,
    enabled: bool,
    disabled_count: usize,
    held: bool,
    unplugged: Vec<u8>,
    fail_read: Vec<u8>,

    eeprom: Vec<u8>,
    eeprom_pointer: usize,
    eeprom_write_enabled: bool,
    eeprom_dirty: bool,
    eeprom_page_writes: usize,

    rtc: [u8; RTC_REGISTERS],
    rtc_pointer: usize,
    /// Seconds into the current timer period (minutes source).
    timer_prescale: u32,

    thermo_pointer: u8,
    thermo_config: u8,
    temperature: i8,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    pub fn new() -> Self {
        let mut rtc = [0u8; RTC_REGISTERS];
        // 2024-01-01 00:00:00, Monday
        rtc[usize::from(rtc::REG_SECONDS) + 3] = 0x01;
        rtc[usize::from(rtc::REG_SECONDS) + 4] = 0x01;
        rtc[usize::from(rtc::REG_SECONDS) + 5] = 0x01;
        rtc[usize::from(rtc::REG_SECONDS) + 6] = 0x24;
        Self {
            transfer: Transfer::Idle,
            in_transaction: false,
            enabled: true,
            disabled_count: 0,
            held: false,
            unplugged: Vec::new(),
            fail_read: Vec::new(),
            eeprom: vec![0xFF; EEPROM_SIZE],
            eeprom_pointer: 0,
            eeprom_write_enabled: false,
            eeprom_dirty: false,
            eeprom_page_writes: 0,
            rtc,
            rtc_pointer: 0,
            timer_prescale: 0,
            thermo_pointer: 0,
            thermo_config: 0,
            temperature: 22,
        }
    }

    // ── Fault injection ───────────────────────────────────────

    /// Remove the device at `address` from the bus.
    pub fn unplug(&mut self, address: u8) {
        self.unplugged.push(address);
    }

    pub fn replug(&mut self, address: u8) {
        self.unplugged.retain(|&a| a != address);
    }

    /// The device acknowledges writes but not its read address.
    pub fn fail_read_address(&mut self, address: u8) {
        self.fail_read.push(address);
    }

    /// Another master holds the bus; no start condition can be sent.
    pub fn hold_bus(&mut self, held: bool) {
        self.held = held;
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn disabled_count(&self) -> usize {
        self.disabled_count
    }

    pub fn eeprom_bytes(&self) -> &[u8] {
        &self.eeprom
    }

    pub fn eeprom_page_writes(&self) -> usize {
        self.eeprom_page_writes
    }

    pub fn rtc_register_mut(&mut self) -> &mut [u8; RTC_REGISTERS] {
        &mut self.rtc
    }

    pub fn set_temperature(&mut self, celsius: i8) {
        self.temperature = celsius;
    }

    pub fn thermometer_shut_down(&self) -> bool {
        self.thermo_config & THERMO_SHUTDOWN != 0
    }

    /// Driven by the board's write-enable rail.
    pub fn set_eeprom_write_enable(&mut self, on: bool) {
        self.eeprom_write_enabled = on;
    }

    // ── Clock ─────────────────────────────────────────────────

    /// Advance the RTC by one second.  Returns `true` when the countdown
    /// timer expired with its interrupt enabled.
    pub fn tick_second(&mut self) -> bool {
        self.advance_calendar();

        let control = self.rtc[usize::from(rtc::REG_TIMER_CONTROL)];
        if control & rtc::TIMER_ENABLE == 0 {
            self.timer_prescale = 0;
            return false;
        }
        let period = match control & 0x03 {
            rtc::TIMER_SOURCE_MINUTES => 60,
            rtc::TIMER_SOURCE_SECONDS => 1,
            // faster sources count once per second here
            _ => 1,
        };
        self.timer_prescale += 1;
        if self.timer_prescale < period {
            return false;
        }
        self.timer_prescale = 0;

        let timer = &mut self.rtc[usize::from(rtc::REG_TIMER)];
        if *timer == 0 {
            return false;
        }
        *timer -= 1;
        if *timer != 0 {
            return false;
        }
        let control_2 = &mut self.rtc[usize::from(rtc::REG_CONTROL_2)];
        *control_2 |= rtc::TIMER_FLAG;
        *control_2 & rtc::TIMER_INTERRUPT_ENABLE != 0
    }

    fn advance_calendar(&mut self) {
        let base = usize::from(rtc::REG_SECONDS);
        let r = &mut self.rtc;
        let mut second = bcd_to_bin(r[base] & 0x7F) + 1;
        let mut minute = bcd_to_bin(r[base + 1] & 0x7F);
        let mut hour = bcd_to_bin(r[base + 2] & 0x3F);
        let mut day = bcd_to_bin(r[base + 3] & 0x3F);
        let mut month = bcd_to_bin(r[base + 5] & 0x1F);
        let mut year = bcd_to_bin(r[base + 6]);
        if second == 60 {
            second = 0;
            minute += 1;
        }
        if minute == 60 {
            minute = 0;
            hour += 1;
        }
        if hour == 24 {
            hour = 0;
            day += 1;
            r[base + 4] = (r[base + 4] + 1) % 7;
        }
        if day > days_in_month(month, year) {
            day = 1;
            month += 1;
        }
        if month > 12 {
            month = 1;
            year = (year + 1) % 100;
        }
        r[base] = (r[base] & 0x80) | bin_to_bcd(second);
        r[base + 1] = bin_to_bcd(minute);
        r[base + 2] = bin_to_bcd(hour);
        r[base + 3] = bin_to_bcd(day);
        r[base + 5] = (r[base + 5] & 0x80) | bin_to_bcd(month);
        r[base + 6] = bin_to_bcd(year);
    }

    // ── Bus steps ─────────────────────────────────────────────

    pub fn start(&mut self) -> BusStatus {
        self.enabled = true;
        if self.held {
            return BusStatus::BUS_ERROR;
        }
        let status = if self.in_transaction {
            BusStatus::REPEATED_START
        } else {
            BusStatus::START
        };
        self.in_transaction = true;
        self.transfer = Transfer::Address;
        status
    }

    pub fn send(&mut self, byte: u8) -> BusStatus {
        if !self.enabled {
            return BusStatus::BUS_ERROR;
        }
        match self.transfer {
            Transfer::Address => self.address(byte),
            Transfer::Write { device, index } => {
                self.write_byte(device, index, byte);
                self.transfer = Transfer::Write {
                    device,
                    index: index + 1,
                };
                BusStatus::DATA_WRITE_ACK
            }
            Transfer::Dead => BusStatus::DATA_WRITE_NACK,
            Transfer::Idle | Transfer::Read { .. } => BusStatus::BUS_ERROR,
        }
    }

    pub fn receive(&mut self, _ack: bool) -> u8 {
        match self.transfer {
            Transfer::Read { device } if self.enabled => self.read_byte(device),
            _ => 0xFF,
        }
    }

    pub fn stop(&mut self) {
        if self.eeprom_dirty {
            self.eeprom_dirty = false;
            self.eeprom_page_writes += 1;
        }
        self.in_transaction = false;
        self.transfer = Transfer::Idle;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.disabled_count += 1;
        self.eeprom_dirty = false;
        self.in_transaction = false;
        self.transfer = Transfer::Idle;
    }

    fn present(address: u8) -> bool {
        matches!(address, eeprom::ADDRESS | rtc::ADDRESS | thermometer::ADDRESS)
    }

    fn address(&mut self, byte: u8) -> BusStatus {
        let device = byte >> 1;
        let read = byte & 0x01 != 0;
        let answers = Self::present(device)
            && !self.unplugged.contains(&device)
            && !(read && self.fail_read.contains(&device));
        match (answers, read) {
            (true, false) => {
                self.transfer = Transfer::Write { device, index: 0 };
                BusStatus::ADDRESS_WRITE_ACK
            }
            (true, true) => {
                self.transfer = Transfer::Read { device };
                BusStatus::ADDRESS_READ_ACK
            }
            (false, false) => {
                self.transfer = Transfer::Dead;
                BusStatus::ADDRESS_WRITE_NACK
            }
            (false, true) => {
                self.transfer = Transfer::Dead;
                BusStatus::ADDRESS_READ_NACK
            }
        }
    }

    fn write_byte(&mut self, device: u8, index: usize, byte: u8) {
        match device {
            eeprom::ADDRESS => match index {
                0 => self.eeprom_pointer = usize::from(byte) << 8 | (self.eeprom_pointer & 0xFF),
                1 => self.eeprom_pointer = (self.eeprom_pointer & 0xFF00) | usize::from(byte),
                _ => {
                    // write protected: acknowledged, not stored
                    if self.eeprom_write_enabled {
                        self.eeprom[self.eeprom_pointer] = byte;
                        self.eeprom_dirty = true;
                    }
                    let page = self.eeprom_pointer & !(EEPROM_PAGE - 1);
                    self.eeprom_pointer = page | ((self.eeprom_pointer + 1) & (EEPROM_PAGE - 1));
                }
            },
            rtc::ADDRESS => {
                if index == 0 {
                    self.rtc_pointer = usize::from(byte) % RTC_REGISTERS;
                } else {
                    if self.rtc_pointer == usize::from(rtc::REG_TIMER) {
                        self.timer_prescale = 0;
                    }
                    self.rtc[self.rtc_pointer] = byte;
                    self.rtc_pointer = (self.rtc_pointer + 1) % RTC_REGISTERS;
                }
            }
            thermometer::ADDRESS => {
                if index == 0 {
                    self.thermo_pointer = byte;
                } else if self.thermo_pointer == thermometer::REG_CONFIG {
                    self.thermo_config = byte;
                }
            }
            _ => {}
        }
    }

    fn read_byte(&mut self, device: u8) -> u8 {
        match device {
            eeprom::ADDRESS => {
                let byte = self.eeprom[self.eeprom_pointer];
                self.eeprom_pointer = (self.eeprom_pointer + 1) % EEPROM_SIZE;
                byte
            }
            rtc::ADDRESS => {
                let byte = self.rtc[self.rtc_pointer];
                self.rtc_pointer = (self.rtc_pointer + 1) % RTC_REGISTERS;
                byte
            }
            thermometer::ADDRESS => match self.thermo_pointer {
                thermometer::REG_TEMPERATURE => {
                    // high byte first, then the half-degree bit
                    self.thermo_pointer = 0xFF;
                    self.temperature as u8
                }
                thermometer::REG_CONFIG => self.thermo_config,
                _ => 0,
            },
            _ => 0xFF,
        }
    }
}

fn days_in_month(month: u8, year: u8) -> u8 {
    match month {
        2 if year % 4 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}
