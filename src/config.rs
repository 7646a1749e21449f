//! Logger configuration parameters
//!
//! Tunables for storage layout, bus timing and the storage-controller
//! protocol.  Channel settings are user data rather than configuration and
//! are persisted separately in the storage cells (see
//! [`load_channel_settings`]).

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::CellStorePort;
use crate::error::{Error, Result};
use crate::sensors::{CHANNEL_COUNT, ChannelSettings};

/// Core logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    // --- Circular log (external EEPROM) ---
    /// Records before the log must be exported
    pub max_log_records: u16,
    /// EEPROM address of the 2-byte write index
    pub log_index_address: u16,
    /// EEPROM address of record 0
    pub log_base_address: u16,
    /// EEPROM page size in bytes
    pub eeprom_page_size: u16,
    /// Settle delay after each page write (ms)
    pub eeprom_settle_ms: u32,
    /// EEPROM size in bytes
    pub eeprom_capacity: u32,

    // --- Sensors ---
    /// Thermometer conversion wait (ms)
    pub thermometer_conversion_ms: u32,
    /// Pulse input hold-off after a counted edge (ms)
    pub pulse_debounce_ms: u8,
    /// How long the pulse indicator stays on (ms)
    pub pulse_indicator_ms: u16,

    // --- Storage controller ---
    pub controller: ControllerConfig,
}

/// Storage-controller session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Required prefix of the version response
    pub version_prefix: heapless::String<16>,
    /// Link rate after power-up
    pub base_baud: u32,
    /// Link rate after the baud switch
    pub fast_baud: u32,
    /// Unsolicited lines sent by the controller after power-up
    pub startup_messages: u8,
    /// Power cycles tried when the startup banner is missing
    pub power_up_attempts: u8,
    /// Mount requests tried before giving up
    pub mount_attempts: u8,
    /// Wait after the baud switch before detecting media (ms)
    pub media_settle_ms: u32,
    /// Wait after closing the last file before power-down (ms)
    pub session_close_ms: u32,
    pub timeouts: ProtocolTimeouts,
}

/// Response timeouts per request (ms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolTimeouts {
    pub startup: u32,
    pub version: u32,
    pub baud: u32,
    /// Status sent at the new rate after a baud switch
    pub baud_confirm: u32,
    pub detect: u32,
    pub mount: u32,
    pub open: u32,
    pub close: u32,
    pub write: u32,
    /// Byte-count acknowledgment after the write payload
    pub write_ack: u32,
    /// Per-line poll while a firmware update runs
    pub firmware_update: u32,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            // Circular log
            max_log_records: 1000,
            log_index_address: 0x0000,
            log_base_address: 0x0010,
            eeprom_page_size: 128,
            eeprom_settle_ms: 10,
            eeprom_capacity: 64 * 1024,

            // Sensors
            thermometer_conversion_ms: 300,
            pulse_debounce_ms: 50,
            pulse_indicator_ms: 1000,

            controller: ControllerConfig::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let mut version_prefix = heapless::String::new();
        let _ = version_prefix.push_str("uALFAT");
        Self {
            version_prefix,
            base_baud: 9600,
            fast_baud: 115_200,
            startup_messages: 5,
            power_up_attempts: 2,
            mount_attempts: 3,
            media_settle_ms: 1000,
            session_close_ms: 500,
            timeouts: ProtocolTimeouts::default(),
        }
    }
}

impl Default for ProtocolTimeouts {
    fn default() -> Self {
        Self {
            startup: 100,
            version: 100,
            baud: 100,
            baud_confirm: 500,
            detect: 1000,
            mount: 5000,
            open: 2000,
            close: 1000,
            write: 500,
            write_ack: 1000,
            firmware_update: 5000,
        }
    }
}

impl LoggerConfig {
    /// Bytes per persisted log record
    pub const RECORD_SIZE: u32 = crate::log_store::RECORD_SIZE as u32;

    /// Reject layouts the log store cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_log_records == 0 {
            return Err(Error::Config("max_log_records must be non-zero"));
        }
        if self.eeprom_page_size == 0 || !self.eeprom_page_size.is_power_of_two() {
            return Err(Error::Config("eeprom_page_size must be a power of two"));
        }
        if self.eeprom_capacity > crate::bus::eeprom::ADDRESS_SPACE {
            return Err(Error::Config("eeprom_capacity exceeds the 16-bit address space"));
        }
        let index_end = u32::from(self.log_index_address) + 2;
        let base = u32::from(self.log_base_address);
        if index_end > base && u32::from(self.log_index_address) < base + self.log_bytes() {
            return Err(Error::Config("log index overlaps the record area"));
        }
        if base + self.log_bytes() > self.eeprom_capacity || index_end > self.eeprom_capacity {
            return Err(Error::Config("log does not fit the EEPROM"));
        }
        if self.controller.startup_messages == 0
            || self.controller.power_up_attempts == 0
            || self.controller.mount_attempts == 0
        {
            return Err(Error::Config("controller retry counts must be non-zero"));
        }
        if self.controller.version_prefix.is_empty() {
            return Err(Error::Config("version_prefix must not be empty"));
        }
        Ok(())
    }

    fn log_bytes(&self) -> u32 {
        u32::from(self.max_log_records) * Self::RECORD_SIZE
    }
}

// ── Persisted channel settings ─────────────────────────────────

/// Storage-cell address of the channel settings (after the error log).
pub const CHANNEL_SETTINGS_BASE: u16 = 0x0100;
/// Largest encoded settings blob.
const CHANNEL_SETTINGS_MAX: usize = 96;

/// Load the persisted channel settings; erased or undecodable cells yield
/// all channels disabled.
pub fn load_channel_settings(
    cells: &(impl CellStorePort + ?Sized),
) -> [ChannelSettings; CHANNEL_COUNT] {
    let defaults = [ChannelSettings::disabled(); CHANNEL_COUNT];
    let len = usize::from(cells.read_cell(CHANNEL_SETTINGS_BASE));
    if len == 0 || len > CHANNEL_SETTINGS_MAX {
        info!("Config: no stored channel settings, using defaults");
        return defaults;
    }
    let mut buf = [0u8; CHANNEL_SETTINGS_MAX];
    cells.read_cells(CHANNEL_SETTINGS_BASE + 1, &mut buf[..len]);
    match postcard::from_bytes::<[ChannelSettings; CHANNEL_COUNT]>(&buf[..len]) {
        Ok(settings) => core::array::from_fn(|i| settings[i].normalized(i)),
        Err(e) => {
            warn!("Config: stored channel settings unreadable ({e}), using defaults");
            defaults
        }
    }
}

pub fn save_channel_settings(
    cells: &mut (impl CellStorePort + ?Sized),
    settings: &[ChannelSettings; CHANNEL_COUNT],
) -> Result<()> {
    let mut buf = [0u8; CHANNEL_SETTINGS_MAX];
    let used = postcard::to_slice(settings, &mut buf)
        .map_err(|_| Error::Config("channel settings do not fit"))?
        .len();
    cells.write_cells(CHANNEL_SETTINGS_BASE + 1, &buf[..used]);
    cells.write_cell(CHANNEL_SETTINGS_BASE, used as u8);
    Ok(())
}
