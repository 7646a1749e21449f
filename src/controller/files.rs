//! Fixed removable-media files and their controller handles.
//!
//! The controller has four handles.  Sensor files 1/3 and 2/4 share a
//! handle, so the log export opens them in two turns:
//!
//! ```text
//!  handle   0            1              2             3
//!  ─────────────────────────────────────────────────────────────
//!  turn 0   SYSTEM.LOG   -              SENSOR_1.LOG  SENSOR_2.LOG
//!  turn 1   SYSTEM.LOG   -              SENSOR_3.LOG  SENSOR_4.LOG
//!  other    S_FAST.CSV   SSETTING.LOG
//! ```

use crate::error::FileFamily;
use crate::sensors::CHANNEL_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalFile {
    System,
    Settings,
    Sensor1,
    Sensor2,
    Sensor3,
    Sensor4,
    FastSamples,
}

impl LogicalFile {
    pub const ALL: [Self; 7] = [
        Self::System,
        Self::Settings,
        Self::Sensor1,
        Self::Sensor2,
        Self::Sensor3,
        Self::Sensor4,
        Self::FastSamples,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::System => "SYSTEM.LOG",
            Self::Settings => "SSETTING.LOG",
            Self::Sensor1 => "SENSOR_1.LOG",
            Self::Sensor2 => "SENSOR_2.LOG",
            Self::Sensor3 => "SENSOR_3.LOG",
            Self::Sensor4 => "SENSOR_4.LOG",
            Self::FastSamples => "S_FAST.CSV",
        }
    }

    /// Controller handle digit.
    pub fn handle(self) -> u8 {
        match self {
            Self::System | Self::FastSamples => 0,
            Self::Settings => 1,
            Self::Sensor1 | Self::Sensor3 => 2,
            Self::Sensor2 | Self::Sensor4 => 3,
        }
    }

    /// Error-code family used when an operation on this file fails.
    pub fn family(self) -> FileFamily {
        match self {
            Self::Settings => FileFamily::Settings,
            _ => FileFamily::Log,
        }
    }

    /// Per-channel log file for 0-based channel `index`.
    pub fn for_channel(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Sensor1),
            1 => Some(Self::Sensor2),
            2 => Some(Self::Sensor3),
            3 => Some(Self::Sensor4),
            _ => None,
        }
    }
}

/// Sensor files opened together in each export turn.
pub const EXPORT_TURNS: [[LogicalFile; 2]; 2] = [
    [LogicalFile::Sensor1, LogicalFile::Sensor2],
    [LogicalFile::Sensor3, LogicalFile::Sensor4],
];

/// Turn in which channel `index` is exported.
pub fn export_turn(index: usize) -> Option<usize> {
    let file = LogicalFile::for_channel(index)?;
    EXPORT_TURNS.iter().position(|turn| turn.contains(&file))
}

const _: () = assert!(EXPORT_TURNS.len() * EXPORT_TURNS[0].len() == CHANNEL_COUNT);
