//! Application service: the foreground dispatcher.
//!
//! [`AppService`] owns the log store and the storage-controller client and
//! runs every foreground handler.  Interrupts only post events into
//! [`SharedState`]; [`AppService::run_once`] inspects the pending masks once
//! and runs each pending handler to completion.
//!
//! ```text
//!  SharedState ──events──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                          │          AppService          │
//!        Board ◀──ports────│  LogStore · StorageController│
//!                          └──────────────────────────────┘
//! ```
//!
//! | Event             | Handler                                        |
//! |-------------------|------------------------------------------------|
//! | enclosure opened  | export the circular log                        |
//! | wake alarm        | measure due slow channels, re-arm the RTC      |
//! | pulse detected    | indicator on, arm the clear callback           |
//! | timer callback    | indicator off                                  |
//! | fast export due   | write ready fast-sample halves                 |
//! | display refresh   | emit the latest readings                       |
//! | key changed       | forwarded to the sink                          |

use log::{debug, info, warn};

use crate::bus::{rtc, thermometer};
use crate::config::{LoggerConfig, load_channel_settings, save_channel_settings};
use crate::controller::StorageController;
use crate::controller::export::{export_fast_samples, export_log, export_settings};
use crate::diagnostics::{ErrorLog, capture_reset_cause};
use crate::error::Error;
use crate::events::{CallbackId, EventMask, SharedState, TimerMask};
use crate::log_store::{AppendOutcome, LogRecord, LogStore};
use crate::scheduler::Scheduler;
use crate::sensors::{
    CHANNEL_COUNT, ChannelSettings, SUPPLY_ADC_CHANNEL, SamplingMode, average_conversion,
    supply_millivolts,
};
use crate::timestamp::DateTime;

use super::events::AppEvent;
use super::ports::{Board, EventSink};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<'a> {
    sched: Scheduler<'a>,
    config: LoggerConfig,
    store: LogStore,
    controller: StorageController<'a>,
    error_log: ErrorLog,
    /// Last time read from the RTC.
    now: DateTime,
    board_temp: i8,
    pulse_indicator: bool,
    alarm_armed: bool,
}

impl<'a> AppService<'a> {
    pub fn new(shared: &'a SharedState, config: LoggerConfig) -> Self {
        let sched = Scheduler::new(shared);
        let store = LogStore::new(&config);
        let controller = StorageController::new(sched, config.controller.clone());
        Self {
            sched,
            config,
            store,
            controller,
            error_log: ErrorLog::default(),
            now: DateTime::default(),
            board_temp: 0,
            pulse_indicator: false,
            alarm_armed: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring up peripherals, load persisted state and arm the first wake
    /// alarm.  Peripheral faults are logged and boot continues.
    pub fn boot<H: Board + ?Sized>(&mut self, hw: &mut H, sink: &mut impl EventSink) {
        let error_log_len = self.error_log.init(hw);

        if let Err(e) = rtc::init(hw) {
            warn!("Boot: RTC init failed ({})", e);
        }
        self.refresh_time(hw);
        self.read_board_temp(hw);

        let settings = load_channel_settings(&*hw);
        let debounce = self.config.pulse_debounce_ms;
        self.sched.shared().with_sensors(|bank| {
            bank.set_pulse_debounce_ms(debounce);
            for (i, s) in settings.iter().enumerate() {
                bank.configure(i, *s);
            }
        });

        let enclosure_open = hw.enclosure_open();
        let cause = hw.reset_cause();
        if let Some(e) = capture_reset_cause(hw, enclosure_open, cause) {
            sink.emit(&AppEvent::ErrorRecorded(e.code()));
        }

        self.arm_wake_alarm(hw);
        info!(
            "AppService started at {} {} ({} stored errors)",
            self.now.date(),
            self.now.time(),
            error_log_len
        );
        sink.emit(&AppEvent::Started { error_log_len });
    }

    // ── Dispatch ──────────────────────────────────────────────

    /// Run every pending handler once.  Returns `false` when nothing was
    /// pending, so the caller may idle until the next interrupt.
    pub fn run_once<H: Board + ?Sized>(&mut self, hw: &mut H, sink: &mut impl EventSink) -> bool {
        let events = self.sched.pending_events();
        let timers = self.sched.pending_timer_events();
        let mut ran = false;

        if events.contains(EventMask::ENCLOSURE_OPENED) {
            self.sched.clear_event(EventMask::ENCLOSURE_OPENED);
            let _ = self.export_log_to_media(hw, sink);
            ran = true;
        }
        if events.contains(EventMask::ENCLOSURE_CLOSED) {
            self.sched.clear_event(EventMask::ENCLOSURE_CLOSED);
            debug!("AppService: enclosure closed");
            ran = true;
        }
        if events.contains(EventMask::PULSE_DETECTED) {
            self.sched.clear_event(EventMask::PULSE_DETECTED);
            self.set_pulse_indicator(true, sink);
            self.sched
                .arm_callback(CallbackId::CLEAR_PULSE_INDICATOR, self.config.pulse_indicator_ms);
            ran = true;
        }
        if events.contains(EventMask::TIMER_CALLBACK) {
            self.sched.clear_event(EventMask::TIMER_CALLBACK);
            if self.sched.armed_callbacks().contains(CallbackId::CLEAR_PULSE_INDICATOR) {
                self.sched.disarm_callback(CallbackId::CLEAR_PULSE_INDICATOR);
                self.set_pulse_indicator(false, sink);
            }
            ran = true;
        }
        if events.contains(EventMask::WAKE_ALARM) {
            self.sched.clear_event(EventMask::WAKE_ALARM);
            self.service_slow_channels(hw, sink);
            ran = true;
        }
        if events.contains(EventMask::KEY_CHANGED) {
            self.sched.clear_event(EventMask::KEY_CHANGED);
            sink.emit(&AppEvent::KeyChanged);
            ran = true;
        }

        if timers.contains(TimerMask::FAST_EXPORT_DUE) {
            self.sched.clear_timer_event(TimerMask::FAST_EXPORT_DUE);
            self.export_fast(hw, sink);
            ran = true;
        }
        if timers.contains(TimerMask::DISPLAY_REFRESH) {
            self.sched.clear_timer_event(TimerMask::DISPLAY_REFRESH);
            let readings = self.sched.shared().with_sensors(|b| b.last_measurements());
            sink.emit(&AppEvent::Readings(readings));
            ran = true;
        }
        ran
    }

    // ── Slow channels ─────────────────────────────────────────

    /// Wake-alarm handler: measure every due slow channel, then re-arm the
    /// RTC countdown for the next one.
    pub fn service_slow_channels<H: Board + ?Sized>(
        &mut self,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) {
        self.refresh_time(hw);
        let due = self.sched.shared().with_sensors(|b| b.due_slow_channels());
        if !due.is_empty() {
            self.read_board_temp(hw);
            let supply_mv = supply_millivolts(average_conversion(hw, SUPPLY_ADC_CHANNEL));
            for &index in &due {
                self.commit_measurement(hw, sink, index, supply_mv);
                self.sched.shared().with_sensors(|b| b.reload(index));
            }
        }
        self.arm_wake_alarm(hw);
    }

    /// Take one measurement of channel `index` and append it to the log.
    /// The pulse count is consumed only when the record is stored.
    pub fn commit_measurement<H: Board + ?Sized>(
        &mut self,
        hw: &mut H,
        sink: &mut impl EventSink,
        index: usize,
        supply_mv: u16,
    ) {
        let Some(settings) = self
            .sched
            .shared()
            .with_sensors(|b| b.channel(index).map(|c| *c.settings()))
        else {
            return;
        };
        let raw = match settings.mode {
            SamplingMode::Pulse => self.sched.shared().with_sensors(|b| b.pulse_count()),
            _ => average_conversion(hw, index as u8),
        };
        let record = LogRecord::new(
            self.now.encode(),
            self.board_temp,
            supply_mv,
            index,
            settings.mode,
            raw,
        );

        let store = self.store;
        let now = self.now;
        let controller = &mut self.controller;
        let outcome = store.append(hw, &record, |hw| {
            export_log(controller, hw, &store, &now).is_ok()
        });

        let channel = record.channel();
        match outcome {
            Ok(AppendOutcome::Stored { .. }) => {
                self.sched.shared().with_sensors(|b| {
                    if settings.mode == SamplingMode::Pulse {
                        b.consume_pulses(raw);
                    }
                    b.set_last_raw(index, raw);
                });
                sink.emit(&AppEvent::MeasurementCommitted { channel, raw });
            }
            Ok(AppendOutcome::Dropped) => sink.emit(&AppEvent::RecordDropped { channel }),
            Err(e) => {
                warn!("AppService: channel {} not stored ({})", channel, e);
                sink.emit(&AppEvent::ErrorRecorded(e.code()));
            }
        }
    }

    /// Start the next wake-alarm period.  Slow countdowns are advanced by
    /// the period here, so this runs once per period.
    fn arm_wake_alarm<H: Board + ?Sized>(&mut self, hw: &mut H) {
        let next = self.sched.shared().with_sensors(|b| b.schedule_next_alarm());
        let result = match next {
            Some(minutes) => {
                debug!("AppService: next wake in {} min", minutes);
                rtc::start_alarm(hw, minutes)
            }
            None => rtc::stop_alarm(hw),
        };
        self.alarm_armed = next.is_some() && result.is_ok();
        if let Err(e) = result {
            warn!("AppService: wake alarm not armed ({})", e);
        }
    }

    /// Restart a running wake alarm with the minutes it has left, keeping
    /// the countdowns already advanced for this period.
    fn rearm_wake_alarm<H: Board + ?Sized>(&mut self, hw: &mut H) {
        let slow = self.sched.shared().with_sensors(|b| b.has_slow_channel());
        if !(self.alarm_armed && slow) {
            self.arm_wake_alarm(hw);
            return;
        }
        let result = rtc::read_alarm(hw).and_then(|left| rtc::start_alarm(hw, left.max(1)));
        if let Err(e) = result {
            warn!("AppService: wake alarm not restarted ({})", e);
            self.alarm_armed = false;
        }
    }

    // ── Exports ───────────────────────────────────────────────

    /// Enclosure-opened handler: export the whole log.
    pub fn export_log_to_media<H: Board + ?Sized>(
        &mut self,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<u16, Error> {
        self.refresh_time(hw);
        let result = export_log(&mut self.controller, hw, &self.store, &self.now);
        match result {
            Ok(records) => sink.emit(&AppEvent::ExportFinished { ok: true, records }),
            Err(e) => {
                sink.emit(&AppEvent::ExportFinished { ok: false, records: 0 });
                sink.emit(&AppEvent::ErrorRecorded(e.code()));
            }
        }
        result
    }

    /// Fast-export-due handler: write every ready half.
    pub fn export_fast<H: Board + ?Sized>(&mut self, hw: &mut H, sink: &mut impl EventSink) {
        self.refresh_time(hw);
        for index in 0..CHANNEL_COUNT {
            let Some(samples) = self.sched.shared().with_sensors(|b| b.take_ready_half(index))
            else {
                continue;
            };
            let ok = match export_fast_samples(&mut self.controller, hw, index, &samples, &self.now)
            {
                Ok(()) => true,
                Err(e) => {
                    sink.emit(&AppEvent::ErrorRecorded(e.code()));
                    false
                }
            };
            sink.emit(&AppEvent::FastExportFinished {
                channel: index as u8 + 1,
                ok,
            });
        }
    }

    /// Replace channel `index`'s settings, persist them and append a
    /// settings report to the media.
    pub fn apply_channel_settings<H: Board + ?Sized>(
        &mut self,
        hw: &mut H,
        sink: &mut impl EventSink,
        index: usize,
        settings: ChannelSettings,
    ) -> Result<(), Error> {
        if index >= CHANNEL_COUNT {
            return Err(Error::Config("no such channel"));
        }
        let all = self.sched.shared().with_sensors(|b| {
            b.configure(index, settings);
            b.all_settings()
        });
        save_channel_settings(hw, &all)?;
        self.rearm_wake_alarm(hw);

        self.refresh_time(hw);
        let result = export_settings(&mut self.controller, hw, &all, &self.now);
        sink.emit(&AppEvent::SettingsExported { ok: result.is_ok() });
        if let Err(e) = result {
            sink.emit(&AppEvent::ErrorRecorded(e.code()));
        }
        result
    }

    /// Flash new controller firmware from the removable media.
    pub fn update_firmware<H: Board + ?Sized>(
        &mut self,
        hw: &mut H,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let result = self.controller.update_firmware(hw);
        sink.emit(&AppEvent::FirmwareUpdate { ok: result.is_ok() });
        if let Err(e) = result {
            sink.emit(&AppEvent::ErrorRecorded(e.code()));
        }
        result.map_err(Error::from)
    }

    // ── Helpers ───────────────────────────────────────────────

    fn refresh_time<H: Board + ?Sized>(&mut self, hw: &mut H) {
        match rtc::read_time(hw) {
            Ok(t) => self.now = t,
            Err(e) => warn!("AppService: RTC read failed ({}), keeping {}", e, self.now.time()),
        }
    }

    fn read_board_temp<H: Board + ?Sized>(&mut self, hw: &mut H) {
        match thermometer::read_celsius(hw, self.config.thermometer_conversion_ms) {
            Ok(t) => self.board_temp = t,
            Err(e) => warn!("AppService: thermometer read failed ({})", e),
        }
    }

    fn set_pulse_indicator(&mut self, on: bool, sink: &mut impl EventSink) {
        if self.pulse_indicator != on {
            self.pulse_indicator = on;
            sink.emit(&AppEvent::PulseIndicator(on));
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn now(&self) -> DateTime {
        self.now
    }

    pub fn board_temp(&self) -> i8 {
        self.board_temp
    }

    pub fn pulse_indicator(&self) -> bool {
        self.pulse_indicator
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn controller(&self) -> &StorageController<'a> {
        &self.controller
    }

    pub fn scheduler(&self) -> Scheduler<'a> {
        self.sched
    }

    pub fn error_log(&self) -> ErrorLog {
        self.error_log
    }
}
