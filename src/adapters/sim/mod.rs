//! Host simulation of the logger board.
//!
//! [`SimBoard`] implements every port trait on a simulated microsecond
//! timeline.  Idling or delaying advances the clock; each millisecond
//! boundary runs the tick interrupt against the shared state, and
//! controller response bytes are handed to the UART receive interrupt
//! when their transmission completes.
//!
//! ```text
//!   wait_for_interrupt / delay ──▶ advance ──┬─▶ SimController::poll ──▶ on_serial_byte
//!                                            ├─▶ on_timer_tick (1 ms)
//!                                            └─▶ SimBus::tick_second ──▶ on_wake_alarm
//! ```

pub mod bus;
pub mod controller;

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::app::ports::{
    AdcPort, BoardInputPort, BusStatus, CellStorePort, IdlePort, PowerPort, PowerRail, SerialPort,
    TwoWirePort,
};
use crate::diagnostics::{ERROR_LOG_CAPACITY, ErrorLog};
use crate::events::SharedState;
use bus::SimBus;
use controller::SimController;

/// Internal EEPROM size.
pub const CELL_COUNT: usize = 1024;
/// ADC inputs: four sensor channels plus the supply divider.
pub const ADC_CHANNELS: usize = 5;

pub struct SimBoard<'a> {
    shared: &'a SharedState,
    pub bus: SimBus,
    pub controller: SimController,
    cells: Vec<u8>,
    adc: [u16; ADC_CHANNELS],
    rails: [bool; 3],
    serial_baud: Option<u32>,
    now_us: u64,
    pulse_high: bool,
    enclosure_open: bool,
    reset_cause: u8,
}

impl<'a> SimBoard<'a> {
    pub fn new(shared: &'a SharedState) -> Self {
        Self {
            shared,
            bus: SimBus::new(),
            controller: SimController::new(),
            cells: vec![0xFF; CELL_COUNT],
            // about 11.4 V through the supply divider
            adc: [0, 0, 0, 0, 840],
            rails: [false; 3],
            serial_baud: None,
            now_us: 0,
            pulse_high: true,
            enclosure_open: false,
            reset_cause: 0,
        }
    }

    pub fn shared(&self) -> &'a SharedState {
        self.shared
    }

    // ── Inputs ────────────────────────────────────────────────

    pub fn set_adc(&mut self, channel: u8, raw: u16) {
        if let Some(slot) = self.adc.get_mut(usize::from(channel)) {
            *slot = raw.min(0x03FF);
        }
    }

    pub fn set_pulse_level(&mut self, high: bool) {
        self.pulse_high = high;
    }

    /// Drive `count` low pulses of `low_ms` separated by `high_ms`.
    pub fn send_pulses(&mut self, count: u32, low_ms: u32, high_ms: u32) {
        for _ in 0..count {
            self.pulse_high = false;
            self.advance_ms(low_ms);
            self.pulse_high = true;
            self.advance_ms(high_ms);
        }
    }

    /// Operate the lid switch and raise its interrupt.
    pub fn set_enclosure_open(&mut self, open: bool) {
        if self.enclosure_open != open {
            self.enclosure_open = open;
            self.shared.on_enclosure_changed(open);
        }
    }

    /// Hardware reset cause reported at the next boot.
    pub fn set_reset_cause(&mut self, cause: u8) {
        self.reset_cause = cause;
    }

    pub fn press_key(&mut self) {
        self.shared.on_key_changed();
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn rail(&self, rail: PowerRail) -> bool {
        self.rails[rail_slot(rail)]
    }

    /// Configured UART rate; `None` while the UART is shut down.
    pub fn serial_baud(&self) -> Option<u32> {
        self.serial_baud
    }

    pub fn now_ms(&self) -> u64 {
        self.now_us / 1000
    }

    /// Codes currently stored in the error log.
    pub fn error_log(&self) -> heapless::Vec<u16, { ERROR_LOG_CAPACITY as usize }> {
        ErrorLog::default().entries(self)
    }

    // ── Time ──────────────────────────────────────────────────

    pub fn advance_ms(&mut self, ms: u32) {
        self.advance_us(u64::from(ms) * 1000);
    }

    /// Run the simulation forward, firing every interrupt due on the way.
    pub fn advance_us(&mut self, us: u64) {
        let target = self.now_us + us;
        loop {
            let boundary = (self.now_us / 1000 + 1) * 1000;
            if boundary > target {
                self.deliver_serial(target);
                self.now_us = target;
                return;
            }
            self.deliver_serial(boundary);
            self.now_us = boundary;
            self.tick();
        }
    }

    fn deliver_serial(&mut self, until_us: u64) {
        while let Some((byte, baud)) = self.controller.poll(until_us) {
            // nothing listens while the UART is off
            if let Some(host) = self.serial_baud {
                self.shared.on_serial_byte(byte, baud != host);
            }
        }
    }

    fn tick(&mut self) {
        let shared = self.shared;
        shared.on_timer_tick(self);
        if self.now_us % 1_000_000 == 0 && self.bus.tick_second() {
            trace!("SimBoard: wake alarm at {} ms", self.now_ms());
            shared.on_wake_alarm();
        }
    }
}

fn rail_slot(rail: PowerRail) -> usize {
    match rail {
        PowerRail::StorageController => 0,
        PowerRail::RemovableMedia => 1,
        PowerRail::EepromWriteEnable => 2,
    }
}

// ── Port implementations ──────────────────────────────────────

impl TwoWirePort for SimBoard<'_> {
    fn start(&mut self) -> BusStatus {
        self.bus.start()
    }

    fn send(&mut self, byte: u8) -> BusStatus {
        self.bus.send(byte)
    }

    fn receive(&mut self, ack: bool) -> u8 {
        self.bus.receive(ack)
    }

    fn stop(&mut self) {
        self.bus.stop();
    }

    fn disable(&mut self) {
        self.bus.disable();
    }
}

impl AdcPort for SimBoard<'_> {
    fn convert(&mut self, channel: u8) -> u16 {
        self.adc.get(usize::from(channel)).copied().unwrap_or(0)
    }
}

impl CellStorePort for SimBoard<'_> {
    fn read_cell(&self, address: u16) -> u8 {
        self.cells.get(usize::from(address)).copied().unwrap_or(0xFF)
    }

    fn write_cell(&mut self, address: u16, value: u8) {
        if let Some(cell) = self.cells.get_mut(usize::from(address)) {
            *cell = value;
        }
    }
}

impl PowerPort for SimBoard<'_> {
    fn set_rail(&mut self, rail: PowerRail, on: bool) {
        self.rails[rail_slot(rail)] = on;
        match rail {
            PowerRail::StorageController => self.controller.set_power(on, self.now_us),
            PowerRail::RemovableMedia => self.controller.set_media_power(on),
            PowerRail::EepromWriteEnable => self.bus.set_eeprom_write_enable(on),
        }
    }
}

impl SerialPort for SimBoard<'_> {
    fn configure(&mut self, baud: u32) {
        self.serial_baud = Some(baud);
    }

    fn transmit(&mut self, byte: u8) {
        if let Some(baud) = self.serial_baud {
            self.controller.receive(byte, baud, self.now_us);
        }
    }

    fn shutdown(&mut self) {
        self.serial_baud = None;
    }
}

impl IdlePort for SimBoard<'_> {
    /// The next interrupt is at most one tick away.
    fn wait_for_interrupt(&mut self) {
        let boundary = (self.now_us / 1000 + 1) * 1000;
        self.advance_us(boundary - self.now_us);
    }
}

impl BoardInputPort for SimBoard<'_> {
    fn pulse_input_high(&mut self) -> bool {
        self.pulse_high
    }

    fn enclosure_open(&mut self) -> bool {
        self.enclosure_open
    }

    fn reset_cause(&mut self) -> u8 {
        self.reset_cause
    }
}

impl DelayNs for SimBoard<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.advance_us(u64::from(ns.div_ceil(1000)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance_ms(ms);
    }
}
