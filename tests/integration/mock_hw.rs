//! Shared fixtures for integration tests.
//!
//! Wraps [`SimBoard`] with a recording event sink and helpers that boot the
//! logger with a given channel setup and run the foreground loop for a
//! stretch of simulated time.

use fieldlogger::adapters::sim::SimBoard;
use fieldlogger::app::events::AppEvent;
use fieldlogger::app::ports::{EventSink, IdlePort};
use fieldlogger::app::service::AppService;
use fieldlogger::config::{LoggerConfig, save_channel_settings};
use fieldlogger::events::SharedState;
use fieldlogger::sensors::{CHANNEL_COUNT, ChannelSettings, SamplingMode, Unit};

// ── Recording sink ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Codes announced through `ErrorRecorded`.
    pub fn error_codes(&self) -> Vec<u16> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::ErrorRecorded(code) => Some(*code),
                _ => None,
            })
            .collect()
    }

    pub fn committed(&self) -> Vec<(u8, u16)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::MeasurementCommitted { channel, raw } => Some((*channel, *raw)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Channel presets ───────────────────────────────────────────

#[allow(dead_code)]
pub fn analog(interval_secs: u32) -> ChannelSettings {
    ChannelSettings {
        enabled: true,
        mode: SamplingMode::Analog,
        interval_secs,
        unit: Unit::Bar,
        multiply_factor: 1.0,
    }
}

#[allow(dead_code)]
pub fn pulse(interval_secs: u32) -> ChannelSettings {
    ChannelSettings {
        enabled: true,
        mode: SamplingMode::Pulse,
        interval_secs,
        unit: Unit::Pulses,
        multiply_factor: 1.0,
    }
}

#[allow(dead_code)]
pub fn fast(interval_secs: u32) -> ChannelSettings {
    ChannelSettings {
        enabled: true,
        mode: SamplingMode::FastAnalog,
        interval_secs,
        unit: Unit::Bar,
        multiply_factor: 1.0,
    }
}

// ── Boot / run ────────────────────────────────────────────────

pub struct Rig<'a> {
    pub board: SimBoard<'a>,
    pub app: AppService<'a>,
    pub sink: RecordingSink,
}

#[allow(dead_code)]
impl<'a> Rig<'a> {
    /// Persist `channels` (the rest disabled) and boot the logger the way a
    /// technician does: lid open during power-up, closed afterwards.  The
    /// sink starts empty.
    pub fn boot(
        shared: &'a SharedState,
        config: LoggerConfig,
        channels: &[(usize, ChannelSettings)],
    ) -> Self {
        Self::boot_with(shared, config, channels, |_| {})
    }

    /// [`Rig::boot`] with `prepare` applied to the board before power-up.
    pub fn boot_with(
        shared: &'a SharedState,
        config: LoggerConfig,
        channels: &[(usize, ChannelSettings)],
        prepare: impl FnOnce(&mut SimBoard<'a>),
    ) -> Self {
        let mut board = SimBoard::new(shared);
        prepare(&mut board);
        let mut settings = [ChannelSettings::disabled(); CHANNEL_COUNT];
        for &(index, s) in channels {
            settings[index] = s;
        }
        save_channel_settings(&mut board, &settings).unwrap();
        board.set_enclosure_open(true);
        let mut rig = Self::boot_board(shared, config, board);
        rig.board.set_enclosure_open(false);
        rig.settle();
        rig.sink.events.clear();
        rig
    }

    /// Boot `board` as it is.
    pub fn boot_board(shared: &'a SharedState, config: LoggerConfig, mut board: SimBoard<'a>) -> Self {
        let mut sink = RecordingSink::new();
        let mut app = AppService::new(shared, config);
        app.boot(&mut board, &mut sink);
        Self { board, app, sink }
    }

    /// Run the foreground loop for `ms` of simulated time.
    pub fn run_for(&mut self, ms: u64) {
        let end = self.board.now_ms() + ms;
        while self.board.now_ms() < end {
            if !self.app.run_once(&mut self.board, &mut self.sink) {
                self.board.wait_for_interrupt();
            }
        }
    }

    /// Run every pending handler until nothing is left.
    pub fn settle(&mut self) {
        while self.app.run_once(&mut self.board, &mut self.sink) {}
    }

    pub fn file(&self, name: &str) -> Option<&str> {
        self.board.controller.file(name)
    }

    pub fn file_lines(&self, name: &str) -> Vec<String> {
        self.file(name)
            .map(|text| text.split("\r\n").filter(|l| !l.is_empty()).map(String::from).collect())
            .unwrap_or_default()
    }
}
