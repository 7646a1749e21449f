//! Unified error types for the field logger firmware.
//!
//! Every fault the core can observe maps onto a 16-bit error code that is
//! written to the non-volatile error log (see [`crate::diagnostics`]).  The
//! numeric layout is part of the persisted format and must not change:
//!
//! ```text
//!  0x01pq  bus        p = peripheral|direction, q = failing phase
//!  0x02xx  controller call-site specific
//!  0x03nn  device     nn = code reported by the storage controller
//!  0x99rr  system     rr = hardware reset-cause register
//! ```
//!
//! All variants are `Copy` so they can be passed through the foreground
//! loop and the event sink without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A two-wire bus transaction failed.
    Bus(BusError),
    /// The storage controller failed or reported a fault.
    Controller(ControllerError),
    /// Unexpected reset captured at boot.
    System(SystemError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl Error {
    /// Persisted 16-bit code for the error log.
    pub fn code(&self) -> u16 {
        match self {
            Self::Bus(e) => e.code(),
            Self::Controller(e) => e.code(),
            Self::System(e) => e.code(),
            Self::Config(_) => 0,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Controller(e) => write!(f, "controller: {e}"),
            Self::System(e) => write!(f, "system: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

/// Device on the shared two-wire bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peripheral {
    /// Real-time clock.
    Rtc,
    /// External paged EEPROM holding the circular log.
    Eeprom,
    /// Board temperature sensor.
    Thermometer,
}

impl Peripheral {
    fn code_offset(self) -> u16 {
        match self {
            Self::Rtc => 0x00,
            Self::Eeprom => 0x20,
            Self::Thermometer => 0x40,
        }
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtc => write!(f, "RTC"),
            Self::Eeprom => write!(f, "EEPROM"),
            Self::Thermometer => write!(f, "thermometer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write,
    Read,
}

/// The handshake step at which a transaction was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusPhase {
    /// Start (or repeated start) condition was not acknowledged by the bus.
    StartNotSent,
    /// Device did not acknowledge its write address.
    AddressNotAcked,
    /// Device did not acknowledge a register or payload byte.
    DataNotAcked,
    /// Device did not acknowledge its read address after the repeated start.
    RepeatedStartAddressNotAcked,
}

impl BusPhase {
    fn code_offset(self) -> u16 {
        match self {
            Self::StartNotSent => 1,
            Self::AddressNotAcked => 2,
            Self::DataNotAcked => 3,
            Self::RepeatedStartAddressNotAcked => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusError {
    pub peripheral: Peripheral,
    pub direction: Direction,
    pub phase: BusPhase,
}

impl BusError {
    pub const fn new(peripheral: Peripheral, direction: Direction, phase: BusPhase) -> Self {
        Self {
            peripheral,
            direction,
            phase,
        }
    }

    pub fn code(&self) -> u16 {
        let dir = match self.direction {
            Direction::Write => 0x00,
            Direction::Read => 0x10,
        };
        0x0100 | self.peripheral.code_offset() | dir | self.phase.code_offset()
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Write => "write",
            Direction::Read => "read",
        };
        let phase = match self.phase {
            BusPhase::StartNotSent => "start not sent",
            BusPhase::AddressNotAcked => "address not acked",
            BusPhase::DataNotAcked => "data not acked",
            BusPhase::RepeatedStartAddressNotAcked => "repeated-start address not acked",
        };
        write!(f, "{} {dir}: {phase} (0x{:04X})", self.peripheral, self.code())
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Storage-controller errors
// ---------------------------------------------------------------------------

/// Which group of logical files a file-level failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFamily {
    /// The settings report (`SSETTING.LOG`).
    Settings,
    /// Log export files (system, per-channel, fast-sample).
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    /// No startup banner after all power-up attempts.
    NotResponding,
    /// Version query answered with an unexpected prefix.
    BadVersion,
    /// Status line did not start with `!` followed by two hex digits.
    MalformedResponse,
    /// A request timed out waiting for its response line.
    NoResponse,
    BaudSwitchFailed,
    MountFailed,
    /// Session setup failed before any file was touched.
    InitFailed,
    OpenFailed(FileFamily),
    CloseFailed(FileFamily),
    AppendFailed(FileFamily),
    /// Formatted text did not fit the transmit buffer.
    TxOverflow,
    /// Receive buffer filled before a terminator arrived.
    RxOverflow,
    /// The controller reported fault code `n`.
    Device(u8),
}

impl ControllerError {
    pub fn code(&self) -> u16 {
        match self {
            Self::NotResponding => 0x0201,
            Self::BadVersion => 0x0202,
            Self::MalformedResponse => 0x0203,
            Self::NoResponse => 0x0204,
            Self::BaudSwitchFailed => 0x0205,
            Self::OpenFailed(FileFamily::Settings) => 0x0207,
            Self::CloseFailed(FileFamily::Settings) => 0x0208,
            Self::AppendFailed(FileFamily::Settings) => 0x0209,
            Self::OpenFailed(FileFamily::Log) => 0x020A,
            Self::CloseFailed(FileFamily::Log) => 0x020B,
            Self::AppendFailed(FileFamily::Log) => 0x020C,
            Self::TxOverflow => 0x020D,
            Self::RxOverflow => 0x020E,
            Self::MountFailed => 0x0285,
            Self::InitFailed => 0x0286,
            Self::Device(n) => 0x0300 | u16::from(*n),
        }
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotResponding => write!(f, "controller not responding"),
            Self::BadVersion => write!(f, "bad controller version"),
            Self::MalformedResponse => write!(f, "malformed status response"),
            Self::NoResponse => write!(f, "no response"),
            Self::BaudSwitchFailed => write!(f, "baud switch failed"),
            Self::MountFailed => write!(f, "cannot mount removable media"),
            Self::InitFailed => write!(f, "session init failed"),
            Self::OpenFailed(fam) => write!(f, "{fam:?} file open failed"),
            Self::CloseFailed(fam) => write!(f, "{fam:?} file close failed"),
            Self::AppendFailed(fam) => write!(f, "{fam:?} file append failed"),
            Self::TxOverflow => write!(f, "transmit buffer overflow"),
            Self::RxOverflow => write!(f, "receive buffer overflow"),
            Self::Device(n) => write!(f, "device error {n:02X}"),
        }
    }
}

impl From<ControllerError> for Error {
    fn from(e: ControllerError) -> Self {
        Self::Controller(e)
    }
}

// ---------------------------------------------------------------------------
// System errors
// ---------------------------------------------------------------------------

/// Unexpected reset; carries the raw reset-cause register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemError(pub u8);

impl SystemError {
    pub fn code(&self) -> u16 {
        0x9900 | u16::from(self.0)
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected reset (cause 0x{:02X})", self.0)
    }
}

impl From<SystemError> for Error {
    fn from(e: SystemError) -> Self {
        Self::System(e)
    }
}
