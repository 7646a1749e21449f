//! Port traits: the boundary between the logger core and the peripheral
//! register interface.
//!
//! ```text
//!   Board adapter ──▶ Port traits ──▶ bus / scheduler / controller / AppService
//! ```
//!
//! The core never touches registers directly.  A board adapter (real MCU
//! registers, or [`SimBoard`](crate::adapters::sim::SimBoard) on the host)
//! implements these traits and is passed by `&mut` into every operation, so
//! each subsystem states exactly which peripherals it needs.
//!
//! Interrupt handlers do not go through these traits except for the tick
//! ISR, which needs [`AdcPort`] and [`BoardInputPort`] for sampling and
//! debouncing (see [`SharedState::on_timer_tick`](crate::events::SharedState::on_timer_tick)).

use embedded_hal::delay::DelayNs;

// ───────────────────────────────────────────────────────────────
// Two-wire bus (driven adapter: core → bus controller registers)
// ───────────────────────────────────────────────────────────────

/// Hardware status code reported by the two-wire controller after each
/// bus step.  Values follow the classic TWI status register layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStatus(pub u8);

impl BusStatus {
    pub const START: Self = Self(0x08);
    pub const REPEATED_START: Self = Self(0x10);
    pub const ADDRESS_WRITE_ACK: Self = Self(0x18);
    pub const ADDRESS_WRITE_NACK: Self = Self(0x20);
    pub const DATA_WRITE_ACK: Self = Self(0x28);
    pub const DATA_WRITE_NACK: Self = Self(0x30);
    pub const ADDRESS_READ_ACK: Self = Self(0x40);
    pub const ADDRESS_READ_NACK: Self = Self(0x48);
    /// Illegal start/stop or controller disabled.
    pub const BUS_ERROR: Self = Self(0x00);
}

/// Raw step-level access to the two-wire bus controller.
pub trait TwoWirePort {
    /// Issue a start condition (a repeated start if a transaction is open).
    fn start(&mut self) -> BusStatus;

    /// Shift one byte out (address or data) and report the resulting status.
    fn send(&mut self, byte: u8) -> BusStatus;

    /// Shift one byte in, answering with ACK (`true`) or NACK.
    fn receive(&mut self, ack: bool) -> u8;

    /// Issue a stop condition.
    fn stop(&mut self);

    /// Switch the bus controller off after a failed transaction.
    fn disable(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Analog inputs
// ───────────────────────────────────────────────────────────────

pub trait AdcPort {
    /// Select `channel` and run one conversion (10-bit result).
    fn convert(&mut self, channel: u8) -> u16;
}

// ───────────────────────────────────────────────────────────────
// Persistent byte cells (internal EEPROM)
// ───────────────────────────────────────────────────────────────

/// Byte-addressed persistent storage holding the error log and the channel
/// settings.  Erased cells read as `0xFF`.
pub trait CellStorePort {
    fn read_cell(&self, address: u16) -> u8;

    fn write_cell(&mut self, address: u16, value: u8);

    fn read_cells(&self, address: u16, buf: &mut [u8]) {
        for (offset, slot) in buf.iter_mut().enumerate() {
            *slot = self.read_cell(address.wrapping_add(offset as u16));
        }
    }

    fn write_cells(&mut self, address: u16, data: &[u8]) {
        for (offset, &byte) in data.iter().enumerate() {
            self.write_cell(address.wrapping_add(offset as u16), byte);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Power rails
// ───────────────────────────────────────────────────────────────

/// Switchable supply / enable lines on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRail {
    /// Supply of the serial storage controller.
    StorageController,
    /// Supply of the removable media slot.
    RemovableMedia,
    /// Write-enable line of the external EEPROM (off = write protected).
    EepromWriteEnable,
}

pub trait PowerPort {
    fn set_rail(&mut self, rail: PowerRail, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Serial link to the storage controller
// ───────────────────────────────────────────────────────────────

/// Transmit side of the UART.  Received bytes arrive through
/// [`SharedState::on_serial_byte`](crate::events::SharedState::on_serial_byte).
pub trait SerialPort {
    /// (Re)configure the UART for `baud` and enable RX/TX.
    fn configure(&mut self, baud: u32);

    /// Blocking transmit of one byte.
    fn transmit(&mut self, byte: u8);

    /// Disable the UART and its receive interrupt.
    fn shutdown(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Idle / digital inputs
// ───────────────────────────────────────────────────────────────

/// Sleep until the next interrupt.  The foreground wait loops call this
/// between polls of the event mask.
pub trait IdlePort {
    fn wait_for_interrupt(&mut self);
}

/// Digital inputs sampled by the tick ISR and at boot.
pub trait BoardInputPort {
    /// Level of the pulse counter input (active low).
    fn pulse_input_high(&mut self) -> bool;

    /// Enclosure lid switch.
    fn enclosure_open(&mut self) -> bool;

    /// Raw hardware reset-cause register, read once at boot.
    fn reset_cause(&mut self) -> u8;
}

// ───────────────────────────────────────────────────────────────
// Event sink (driven adapter: core → display / log)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`AppEvent`](super::events::AppEvent)s through
/// this port.  A display adapter would render the status marker, the log
/// adapter writes a line.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Combined bounds
// ───────────────────────────────────────────────────────────────
//
// A single `&mut hw` satisfies several ports at once; this avoids double
// mutable borrows while keeping each subsystem's needs explicit.

/// Everything the bus driver touches: the bus itself, the error log cells,
/// the EEPROM write-enable rail, and a delay for page-write settling.
pub trait BusHardware: TwoWirePort + CellStorePort + PowerPort + DelayNs {}

impl<T: TwoWirePort + CellStorePort + PowerPort + DelayNs + ?Sized> BusHardware for T {}

/// Everything the storage-controller client touches.
pub trait ControllerHardware: SerialPort + PowerPort + CellStorePort + IdlePort {}

impl<T: SerialPort + PowerPort + CellStorePort + IdlePort + ?Sized> ControllerHardware for T {}

/// Peripherals sampled from the tick ISR.
pub trait TickHardware: AdcPort + BoardInputPort {}

impl<T: AdcPort + BoardInputPort + ?Sized> TickHardware for T {}

/// The whole board.
pub trait Board: BusHardware + ControllerHardware + TickHardware {}

impl<T: BusHardware + ControllerHardware + TickHardware + ?Sized> Board for T {}
