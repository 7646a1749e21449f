//! Persistent error log and boot diagnostics.
//!
//! Error codes (see [`crate::error`]) are appended to a bounded region of
//! the internal storage cells:
//!
//! ```text
//!  base      base+1          base+3                base+1+2*(N-1)
//! ┌─────┬───────────────┬───────────────┬─────┬───────────────┐
//! │ len │ code 0 (LE)   │ code 1 (LE)   │ ... │ code N-1 (LE) │
//! └─────┴───────────────┴───────────────┴─────┴───────────────┘
//! ```
//!
//! The oldest entries are never evicted; once `len` reaches the capacity
//! further codes are dropped.  An erased length cell (`0xFF`) is treated as
//! an empty log.

use log::{info, warn};

use crate::app::ports::CellStorePort;
use crate::error::SystemError;

/// Start of the error log region in the storage cells.
pub const ERROR_LOG_BASE: u16 = 0x0000;
/// Maximum number of stored codes.
pub const ERROR_LOG_CAPACITY: u8 = 127;

const ERASED: u8 = 0xFF;

/// Cell-backed append-only error log.
#[derive(Debug, Clone, Copy)]
pub struct ErrorLog {
    base: u16,
    capacity: u8,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(ERROR_LOG_BASE, ERROR_LOG_CAPACITY)
    }
}

impl ErrorLog {
    pub const fn new(base: u16, capacity: u8) -> Self {
        Self { base, capacity }
    }

    /// Load the stored length, initialising an erased region.
    pub fn init(&self, cells: &mut (impl CellStorePort + ?Sized)) -> u8 {
        if cells.read_cell(self.base) == ERASED {
            info!("ErrorLog: erased region, initialising");
            cells.write_cell(self.base, 0);
        }
        self.len(&*cells)
    }

    pub fn len(&self, cells: &(impl CellStorePort + ?Sized)) -> u8 {
        match cells.read_cell(self.base) {
            ERASED => 0,
            n => n.min(self.capacity),
        }
    }

    pub fn is_full(&self, cells: &(impl CellStorePort + ?Sized)) -> bool {
        self.len(cells) >= self.capacity
    }

    /// Append `code`.  Returns `false` if the log is full or the code is 0.
    pub fn record(&self, cells: &mut (impl CellStorePort + ?Sized), code: u16) -> bool {
        let len = self.len(&*cells);
        if code == 0 {
            return false;
        }
        if len >= self.capacity {
            warn!("ErrorLog: full, dropping 0x{:04X}", code);
            return false;
        }
        cells.write_cells(self.slot(len), &code.to_le_bytes());
        cells.write_cell(self.base, len + 1);
        true
    }

    /// All stored codes, oldest first.
    pub fn entries(
        &self,
        cells: &(impl CellStorePort + ?Sized),
    ) -> heapless::Vec<u16, { ERROR_LOG_CAPACITY as usize }> {
        let mut out = heapless::Vec::new();
        for i in 0..self.len(cells) {
            let mut raw = [0u8; 2];
            cells.read_cells(self.slot(i), &mut raw);
            let _ = out.push(u16::from_le_bytes(raw));
        }
        out
    }

    pub fn clear(&self, cells: &mut (impl CellStorePort + ?Sized)) {
        cells.write_cell(self.base, 0);
    }

    fn slot(&self, index: u8) -> u16 {
        self.base + 1 + 2 * u16::from(index)
    }
}

/// Record `code` in the default error log region.
pub fn record_error(cells: &mut (impl CellStorePort + ?Sized), code: u16) -> bool {
    ErrorLog::default().record(cells, code)
}

/// Boot-time reset check.  A reset while the enclosure is closed was not
/// caused by a technician and is logged as a system error.
pub fn capture_reset_cause(
    cells: &mut (impl CellStorePort + ?Sized),
    enclosure_open: bool,
    cause: u8,
) -> Option<SystemError> {
    if enclosure_open {
        return None;
    }
    let err = SystemError(cause);
    warn!("Diagnostics: {}", err);
    record_error(cells, err.code());
    Some(err)
}
