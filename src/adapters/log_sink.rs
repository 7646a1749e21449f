//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade.  A display adapter would implement the same trait and
//! render the status marker instead.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn marker(ok: bool) -> &'static str {
    if ok { "OK" } else { "ERR" }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { error_log_len } => {
                info!("START | stored_errors={}", error_log_len);
            }
            AppEvent::ExportFinished { ok, records } => {
                info!("EXPORT | log {} | records={}", marker(*ok), records);
            }
            AppEvent::FastExportFinished { channel, ok } => {
                info!("EXPORT | fast ch{} {}", channel, marker(*ok));
            }
            AppEvent::SettingsExported { ok } => {
                info!("EXPORT | settings {}", marker(*ok));
            }
            AppEvent::PulseIndicator(on) => {
                info!("PULSE | indicator {}", if *on { "on" } else { "off" });
            }
            AppEvent::Readings(raw) => {
                info!(
                    "READ | ch1={} ch2={} ch3={} ch4={}",
                    raw[0], raw[1], raw[2], raw[3]
                );
            }
            AppEvent::KeyChanged => {
                info!("KEY | changed");
            }
            AppEvent::MeasurementCommitted { channel, raw } => {
                info!("LOG | ch{} raw={}", channel, raw);
            }
            AppEvent::RecordDropped { channel } => {
                warn!("LOG | ch{} record dropped (log full)", channel);
            }
            AppEvent::FirmwareUpdate { ok } => {
                info!("FIRMWARE | update {}", marker(*ok));
            }
            AppEvent::ErrorRecorded(code) => {
                warn!("ERROR | code=0x{:04X}", code);
            }
        }
    }
}
