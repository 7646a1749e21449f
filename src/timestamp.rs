//! Calendar time as read from the RTC, and the 32-bit coded timestamp stored
//! in every log record.
//!
//! ```text
//!  31      26 25  22 21   17 16   12 11     6 5      0
//! ┌──────────┬──────┬───────┬───────┬────────┬────────┐
//! │ year-2000│ month│  day  │ hour  │ minute │ second │
//! └──────────┴──────┴───────┴───────┴────────┴────────┘
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTime {
    /// Full year (2000..=2063).
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Default for DateTime {
    fn default() -> Self {
        Self {
            year: 2000,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
        }
    }
}

impl DateTime {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Pack into the log record timestamp.
    pub fn encode(&self) -> u32 {
        let year = u32::from(self.year.saturating_sub(2000)) & 0x3F;
        year << 26
            | (u32::from(self.month) & 0x0F) << 22
            | (u32::from(self.day) & 0x1F) << 17
            | (u32::from(self.hour) & 0x1F) << 12
            | (u32::from(self.minute) & 0x3F) << 6
            | (u32::from(self.second) & 0x3F)
    }

    pub fn decode(coded: u32) -> Self {
        Self {
            year: 2000 + ((coded >> 26) & 0x3F) as u16,
            month: ((coded >> 22) & 0x0F) as u8,
            day: ((coded >> 17) & 0x1F) as u8,
            hour: ((coded >> 12) & 0x1F) as u8,
            minute: ((coded >> 6) & 0x3F) as u8,
            second: (coded & 0x3F) as u8,
        }
    }

    /// FAT directory timestamp (years since 1980, two-second resolution),
    /// used to set the storage controller's clock.
    pub fn fat_timestamp(&self) -> u32 {
        let year = u32::from(self.year.saturating_sub(1980)) & 0x7F;
        year << 25
            | (u32::from(self.month) & 0x0F) << 21
            | (u32::from(self.day) & 0x1F) << 16
            | (u32::from(self.hour) & 0x1F) << 11
            | (u32::from(self.minute) & 0x3F) << 5
            | (u32::from(self.second) / 2) & 0x1F
    }

    /// `DD.MM.YY`
    pub fn date(&self) -> DateText {
        DateText(*self)
    }

    /// `HH:MM:SS`
    pub fn time(&self) -> TimeText {
        TimeText(*self)
    }
}

pub struct DateText(DateTime);

impl fmt::Display for DateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}.{:02}.{:02}",
            self.0.day,
            self.0.month,
            self.0.year % 100
        )
    }
}

pub struct TimeText(DateTime);

impl fmt::Display for TimeText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0.hour, self.0.minute, self.0.second
        )
    }
}

/// Seconds rendered as `HH:MM:SS` (channel intervals in the settings report).
pub struct Duration(pub u32);

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(f, "{:02}:{:02}:{:02}", s / 3600, (s / 60) % 60, s % 60)
    }
}

pub(crate) fn bcd_to_bin(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

pub(crate) fn bin_to_bcd(bin: u8) -> u8 {
    ((bin / 10) << 4) | (bin % 10)
}
