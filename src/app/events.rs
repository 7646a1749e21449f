//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: render the status marker on the
//! display, write a log line, drive the pulse LED.

use crate::sensors::CHANNEL_COUNT;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Boot finished; carries the number of stored error codes.
    Started { error_log_len: u8 },

    /// Log export triggered by opening the enclosure (`"OK"` / error marker).
    ExportFinished { ok: bool, records: u16 },

    /// One fast-sample half was written (or failed).
    FastExportFinished { channel: u8, ok: bool },

    /// Channel settings changed and the report was written (or failed).
    SettingsExported { ok: bool },

    /// Pulse indicator on/off.
    PulseIndicator(bool),

    /// Latest raw reading per channel, for the display.
    Readings([u16; CHANNEL_COUNT]),

    /// A key changed state; menu handling lives outside the core.
    KeyChanged,

    /// A slow-channel measurement was stored in the log.
    MeasurementCommitted { channel: u8, raw: u16 },

    /// The log was full and could not be exported.
    RecordDropped { channel: u8 },

    /// Controller firmware update finished.
    FirmwareUpdate { ok: bool },

    /// An error code was raised by a foreground handler.
    ErrorRecorded(u16),
}
