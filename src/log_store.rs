//! Circular log of fixed-size measurement records in the external EEPROM.
//!
//! ```text
//!  index_addr        base        base+9      base+9*i           base+9*max
//! ┌────────────┐    ┌───────────┬───────────┬─────┬───────────┬─────────┐
//! │ write idx  │    │ record 0  │ record 1  │ ... │ record i  │  free   │
//! │ (u16 LE)   │    └───────────┴───────────┴─────┴───────────┴─────────┘
//! └────────────┘     ◀──────── committed: 0..idx ──────────▶
//! ```
//!
//! The index always points one past the last committed record.  A full
//! log must be exported before it may wrap to zero; if the export fails
//! the new record is dropped and nothing already stored is overwritten.

use log::{debug, info, warn};

use crate::app::ports::BusHardware;
use crate::bus::eeprom::{self, Eeprom};
use crate::config::LoggerConfig;
use crate::error::BusError;
use crate::sensors::SamplingMode;

/// Bytes per record on the EEPROM.
pub const RECORD_SIZE: usize = 9;
/// Largest magnitude the 12-bit value field holds.
pub const MAGNITUDE_MAX: u16 = 0x0FFF;

// ── Record ────────────────────────────────────────────────────

/// One committed measurement.
///
/// `value` packs the channel and sampling kind above a 12-bit magnitude:
/// `channel_index << 14 | kind << 12 | magnitude`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecord {
    /// Coded timestamp, see [`DateTime::encode`](crate::timestamp::DateTime::encode).
    pub timestamp: u32,
    /// Board temperature in °C.
    pub board_temp: i8,
    pub supply_mv: u16,
    pub value: u16,
}

impl LogRecord {
    /// Build a record for 0-based `channel_index`.  Magnitudes above 12
    /// bits saturate.
    pub fn new(
        timestamp: u32,
        board_temp: i8,
        supply_mv: u16,
        channel_index: usize,
        kind: SamplingMode,
        magnitude: u16,
    ) -> Self {
        let value = ((channel_index as u16) & 0x03) << 14
            | u16::from(kind.kind_bits() & 0x03) << 12
            | magnitude.min(MAGNITUDE_MAX);
        Self {
            timestamp,
            board_temp,
            supply_mv,
            value,
        }
    }

    /// 0-based channel index.
    pub fn channel_index(&self) -> usize {
        usize::from(self.value >> 14)
    }

    /// 1-based channel number as shown to users.
    pub fn channel(&self) -> u8 {
        (self.value >> 14) as u8 + 1
    }

    pub fn kind(&self) -> Option<SamplingMode> {
        SamplingMode::from_kind_bits(((self.value >> 12) & 0x03) as u8)
    }

    pub fn magnitude(&self) -> u16 {
        self.value & MAGNITUDE_MAX
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.timestamp.to_le_bytes());
        out[4] = self.board_temp as u8;
        out[5..7].copy_from_slice(&self.supply_mv.to_le_bytes());
        out[7..9].copy_from_slice(&self.value.to_le_bytes());
        out
    }

    pub fn decode(raw: &[u8; RECORD_SIZE]) -> Self {
        Self {
            timestamp: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            board_temp: raw[4] as i8,
            supply_mv: u16::from_le_bytes([raw[5], raw[6]]),
            value: u16::from_le_bytes([raw[7], raw[8]]),
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Record written at `index`.
    Stored { index: u16 },
    /// The log was full and could not be exported.
    Dropped,
}

#[derive(Debug, Clone, Copy)]
pub struct LogStore {
    index_addr: u16,
    base: u16,
    max_records: u16,
    eeprom: Eeprom,
}

impl LogStore {
    /// The record count is capped to what fits below the end of the
    /// EEPROM address space.
    pub fn new(config: &LoggerConfig) -> Self {
        let room =
            (eeprom::ADDRESS_SPACE - u32::from(config.log_base_address)) / RECORD_SIZE as u32;
        let max_records = u16::try_from(room)
            .unwrap_or(u16::MAX)
            .min(config.max_log_records);
        if max_records < config.max_log_records {
            warn!(
                "LogStore: {} records do not fit, capped at {}",
                config.max_log_records, max_records
            );
        }
        Self {
            index_addr: config.log_index_address,
            base: config.log_base_address,
            max_records,
            eeprom: Eeprom::from_config(config),
        }
    }

    pub fn capacity(&self) -> u16 {
        self.max_records
    }

    /// Persisted write index.  A value past the capacity (erased EEPROM
    /// reads `0xFFFF`) is reset to zero.
    pub fn read_index<H: BusHardware + ?Sized>(&self, hw: &mut H) -> Result<u16, BusError> {
        let mut raw = [0u8; 2];
        self.eeprom.read(hw, self.index_addr, &mut raw)?;
        let index = u16::from_le_bytes(raw);
        if index > self.max_records {
            warn!("LogStore: corrupt write index {}, resetting", index);
            self.write_index(hw, 0)?;
            return Ok(0);
        }
        Ok(index)
    }

    /// Append `record`.  When the log is full `export` is asked to drain it
    /// first; it returns `true` once the log has been exported and reset.
    pub fn append<H, F>(
        &self,
        hw: &mut H,
        record: &LogRecord,
        export: F,
    ) -> Result<AppendOutcome, BusError>
    where
        H: BusHardware + ?Sized,
        F: FnOnce(&mut H) -> bool,
    {
        let mut index = self.read_index(hw)?;
        if index >= self.max_records {
            info!("LogStore: full ({} records), exporting", index);
            if !export(hw) {
                warn!("LogStore: export failed, record for channel {} dropped", record.channel());
                return Ok(AppendOutcome::Dropped);
            }
            index = self.read_index(hw)?;
            if index >= self.max_records {
                warn!("LogStore: index not reset after export, record dropped");
                return Ok(AppendOutcome::Dropped);
            }
        }
        self.eeprom.write(hw, self.record_address(index), &record.encode())?;
        self.write_index(hw, index + 1)?;
        debug!("LogStore: stored record {} (value 0x{:04X})", index, record.value);
        Ok(AppendOutcome::Stored { index })
    }

    pub fn read_record<H: BusHardware + ?Sized>(
        &self,
        hw: &mut H,
        index: u16,
    ) -> Result<LogRecord, BusError> {
        let mut raw = [0u8; RECORD_SIZE];
        self.eeprom.read(hw, self.record_address(index), &mut raw)?;
        Ok(LogRecord::decode(&raw))
    }

    /// Visit every committed record in commit order.  Returns the number
    /// visited.
    pub fn scan<H, E>(
        &self,
        hw: &mut H,
        mut visit: impl FnMut(&mut H, u16, LogRecord) -> Result<(), E>,
    ) -> Result<u16, E>
    where
        H: BusHardware + ?Sized,
        E: From<BusError>,
    {
        let count = self.read_index(hw)?;
        for index in 0..count {
            let record = self.read_record(hw, index)?;
            visit(hw, index, record)?;
        }
        Ok(count)
    }

    /// Mark the log empty.  Records stay on the EEPROM until overwritten.
    pub fn reset<H: BusHardware + ?Sized>(&self, hw: &mut H) -> Result<(), BusError> {
        info!("LogStore: reset");
        self.write_index(hw, 0)
    }

    fn write_index<H: BusHardware + ?Sized>(&self, hw: &mut H, index: u16) -> Result<(), BusError> {
        self.eeprom.write(hw, self.index_addr, &index.to_le_bytes())
    }

    /// Wraps like the device's own address counter.
    fn record_address(&self, index: u16) -> u16 {
        self.base.wrapping_add(index.wrapping_mul(RECORD_SIZE as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::SimBoard;
    use crate::events::SharedState;

    fn small_store(max: u16) -> LogStore {
        LogStore::new(&LoggerConfig {
            max_log_records: max,
            ..LoggerConfig::default()
        })
    }

    fn analog(ch: usize, magnitude: u16) -> LogRecord {
        LogRecord::new(0x1234_5678, 21, 3300, ch, SamplingMode::Analog, magnitude)
    }

    #[test]
    fn value_field_packing() {
        let r = LogRecord::new(0, 0, 0, 3, SamplingMode::Pulse, 0x0ABC);
        assert_eq!(r.value, 0b11_01 << 12 | 0x0ABC);
        assert_eq!(r.channel(), 4);
        assert_eq!(r.channel_index(), 3);
        assert_eq!(r.kind(), Some(SamplingMode::Pulse));
        assert_eq!(r.magnitude(), 0x0ABC);
    }

    #[test]
    fn magnitude_saturates_at_12_bits() {
        let r = LogRecord::new(0, 0, 0, 0, SamplingMode::Pulse, 5000);
        assert_eq!(r.magnitude(), MAGNITUDE_MAX);
        assert_eq!(r.channel(), 1);
    }

    #[test]
    fn encode_layout_is_little_endian() {
        let r = LogRecord {
            timestamp: 0x0403_0201,
            board_temp: -2,
            supply_mv: 0x0605,
            value: 0x0807,
        };
        assert_eq!(r.encode(), [1, 2, 3, 4, 0xFE, 5, 6, 7, 8]);
        assert_eq!(LogRecord::decode(&r.encode()), r);
    }

    #[test]
    fn oversized_log_is_capped_to_the_address_space() {
        let store = LogStore::new(&LoggerConfig {
            max_log_records: 14_000,
            eeprom_capacity: 128 * 1024,
            ..LoggerConfig::default()
        });
        assert_eq!(store.capacity(), 7280);

        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        assert!(store.read_record(&mut board, u16::MAX).is_ok());
    }

    #[test]
    fn erased_index_reads_as_empty() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        let store = small_store(10);
        assert_eq!(store.read_index(&mut board).unwrap(), 0);
        assert_eq!(&board.bus.eeprom_bytes()[0..2], &[0, 0]);
    }

    #[test]
    fn appends_advance_index_and_scan_in_order() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        let store = small_store(10);
        for m in [10, 20, 30] {
            let out = store.append(&mut board, &analog(0, m), |_| false).unwrap();
            assert!(matches!(out, AppendOutcome::Stored { .. }));
        }
        assert_eq!(store.read_index(&mut board).unwrap(), 3);

        let mut seen = Vec::new();
        let n = store
            .scan(&mut board, |_, i, r| {
                seen.push((i, r.channel(), r.magnitude()));
                Ok::<_, BusError>(())
            })
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(seen, vec![(0, 1, 10), (1, 1, 20), (2, 1, 30)]);
    }

    #[test]
    fn full_log_with_failed_export_drops_record() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        let store = small_store(2);
        store.append(&mut board, &analog(1, 1), |_| false).unwrap();
        store.append(&mut board, &analog(1, 2), |_| false).unwrap();
        let before = board.bus.eeprom_bytes().to_vec();

        let out = store.append(&mut board, &analog(1, 3), |_| false).unwrap();
        assert_eq!(out, AppendOutcome::Dropped);
        assert_eq!(board.bus.eeprom_bytes(), &before[..]);
    }

    #[test]
    fn full_log_with_successful_export_wraps() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        let store = small_store(2);
        store.append(&mut board, &analog(0, 1), |_| false).unwrap();
        store.append(&mut board, &analog(0, 2), |_| false).unwrap();
        let out = store
            .append(&mut board, &analog(0, 3), |hw| store.reset(hw).is_ok())
            .unwrap();
        assert_eq!(out, AppendOutcome::Stored { index: 0 });
        assert_eq!(store.read_record(&mut board, 0).unwrap().magnitude(), 3);
    }

    #[test]
    fn export_that_forgets_to_reset_still_drops() {
        let shared = SharedState::new();
        let mut board = SimBoard::new(&shared);
        let store = small_store(1);
        store.append(&mut board, &analog(0, 1), |_| false).unwrap();
        let out = store.append(&mut board, &analog(0, 2), |_| true).unwrap();
        assert_eq!(out, AppendOutcome::Dropped);
    }
}
