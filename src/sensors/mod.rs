//! Sensor channels: settings, per-channel sampling state, and the
//! [`SensorBank`] shared with the tick ISR.
//!
//! Three sampling modes exist:
//!
//! | Mode         | Driven by                 | Storage                         |
//! |--------------|---------------------------|---------------------------------|
//! | `Analog`     | RTC wake alarm (minutes)  | one log record per interval     |
//! | `Pulse`      | RTC wake alarm (minutes)  | accumulated count per interval  |
//! | `FastAnalog` | tick ISR, once per second | [`fast::FastSampleBuffer`] halves, exported as CSV |
//!
//! An analog channel configured below one minute always runs in fast mode,
//! and only channel 1 has the pulse input wired.

pub mod fast;
pub mod pulse;

use serde::{Deserialize, Serialize};

use crate::app::ports::AdcPort;
use crate::events::TimerMask;
use fast::FastSampleBuffer;
use pulse::PulseInput;

pub const CHANNEL_COUNT: usize = 4;
/// Samples per fast-buffer half.
pub const FAST_BUFFER_LEN: usize = 16;
/// ADC input wired to the supply voltage divider.
pub const SUPPLY_ADC_CHANNEL: u8 = 4;
/// Conversions averaged per reading.
pub const ADC_AVERAGE_SAMPLES: u32 = 8;
/// Analog intervals below this many seconds switch to fast mode.
pub const FAST_MODE_BELOW_SECS: u32 = 60;
/// Index of the only channel with a pulse input.
pub const PULSE_CHANNEL: usize = 0;

const _: () = assert!(FAST_BUFFER_LEN >= 4 && FAST_BUFFER_LEN <= 128);

// ── Settings ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// 4–20 mA loop, sampled on the wake alarm.
    Analog,
    /// Pulse count accumulated between wake alarms.
    Pulse,
    /// 4–20 mA loop sampled every `interval` seconds into the fast buffer.
    FastAnalog,
}

impl SamplingMode {
    /// Two-bit kind field stored in log records.
    pub fn kind_bits(self) -> u8 {
        match self {
            Self::Analog => 0,
            Self::Pulse => 1,
            Self::FastAnalog => 2,
        }
    }

    pub fn from_kind_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Analog),
            1 => Some(Self::Pulse),
            2 => Some(Self::FastAnalog),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Analog => "4-20mA",
            Self::Pulse => "impulse",
            Self::FastAnalog => "4-20mA fast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Bar,
    MilliAmpere,
    Pulses,
    CubicMetre,
}

impl Unit {
    pub fn label(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::MilliAmpere => "mA",
            Self::Pulses => "imp",
            Self::CubicMetre => "m3",
        }
    }
}

/// Persisted per-channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub enabled: bool,
    pub mode: SamplingMode,
    pub interval_secs: u32,
    pub unit: Unit,
    pub multiply_factor: f32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ChannelSettings {
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            mode: SamplingMode::Analog,
            interval_secs: 3600,
            unit: Unit::Bar,
            multiply_factor: 1.0,
        }
    }

    /// Apply the channel mode rules for channel `index`.
    pub fn normalized(mut self, index: usize) -> Self {
        if self.mode == SamplingMode::Pulse && index != PULSE_CHANNEL {
            self.mode = SamplingMode::Analog;
        }
        self.mode = match self.mode {
            SamplingMode::Analog | SamplingMode::FastAnalog
                if self.interval_secs < FAST_MODE_BELOW_SECS =>
            {
                SamplingMode::FastAnalog
            }
            SamplingMode::FastAnalog => SamplingMode::Analog,
            other => other,
        };
        self
    }

    pub fn is_fast(&self) -> bool {
        self.enabled && self.mode == SamplingMode::FastAnalog
    }

    pub fn is_slow(&self) -> bool {
        self.enabled && self.mode != SamplingMode::FastAnalog
    }
}

// ── Channel state ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChannelState {
    settings: ChannelSettings,
    /// Seconds until the next sample; never exceeds the interval.
    remaining_secs: u32,
    last_raw: u16,
    fast: FastSampleBuffer<FAST_BUFFER_LEN>,
}

impl ChannelState {
    const fn new() -> Self {
        Self {
            settings: ChannelSettings::disabled(),
            remaining_secs: 0,
            last_raw: 0,
            fast: FastSampleBuffer::new(),
        }
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn last_raw(&self) -> u16 {
        self.last_raw
    }

    pub fn fast(&self) -> &FastSampleBuffer<FAST_BUFFER_LEN> {
        &self.fast
    }
}

/// All channels plus the pulse input; lives inside
/// [`SharedState`](crate::events::SharedState).
#[derive(Debug, Clone)]
pub struct SensorBank {
    channels: [ChannelState; CHANNEL_COUNT],
    pulse: PulseInput,
}

impl Default for SensorBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorBank {
    pub const fn new() -> Self {
        const IDLE: ChannelState = ChannelState::new();
        Self {
            channels: [IDLE; CHANNEL_COUNT],
            pulse: PulseInput::new(),
        }
    }

    /// Replace a channel's settings.  The channel samples on its next
    /// service pass and its fast buffer restarts empty.
    pub fn configure(&mut self, index: usize, settings: ChannelSettings) {
        if let Some(ch) = self.channels.get_mut(index) {
            ch.settings = settings.normalized(index);
            ch.remaining_secs = 0;
            ch.fast.reset();
            if index == PULSE_CHANNEL {
                self.pulse.reset();
            }
        }
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelState> {
        self.channels.get(index)
    }

    pub fn all_settings(&self) -> [ChannelSettings; CHANNEL_COUNT] {
        core::array::from_fn(|i| self.channels[i].settings)
    }

    pub fn last_measurements(&self) -> [u16; CHANNEL_COUNT] {
        core::array::from_fn(|i| self.channels[i].last_raw)
    }

    pub fn set_last_raw(&mut self, index: usize, raw: u16) {
        if let Some(ch) = self.channels.get_mut(index) {
            ch.last_raw = raw;
        }
    }

    // ── Pulse input ───────────────────────────────────────────

    pub fn set_pulse_debounce_ms(&mut self, ms: u8) {
        self.pulse.set_debounce_ms(ms);
    }

    /// Tick-ISR hook.  Counts only while channel 1 is an enabled pulse channel.
    pub(crate) fn sample_pulse_input(&mut self, level: bool) -> bool {
        let s = &self.channels[PULSE_CHANNEL].settings;
        if !(s.enabled && s.mode == SamplingMode::Pulse) {
            return false;
        }
        let counted = self.pulse.sample(level);
        if counted {
            self.channels[PULSE_CHANNEL].last_raw = self.pulse.count();
        }
        counted
    }

    pub fn pulse_count(&self) -> u16 {
        self.pulse.count()
    }

    pub fn consume_pulses(&mut self, committed: u16) {
        self.pulse.consume(committed);
    }

    // ── Fast channels ─────────────────────────────────────────

    /// Once-per-second tick-ISR hook for fast channels.  Returns the timer
    /// requests to post.
    pub(crate) fn service_fast(&mut self, adc: &mut (impl AdcPort + ?Sized)) -> TimerMask {
        let mut posted = TimerMask::NONE;
        for (index, ch) in self.channels.iter_mut().enumerate() {
            if !ch.settings.is_fast() || ch.settings.interval_secs == 0 {
                continue;
            }
            if ch.remaining_secs > 1 {
                ch.remaining_secs -= 1;
                continue;
            }
            let raw = average_conversion(adc, index as u8);
            ch.last_raw = raw;
            ch.remaining_secs = ch.settings.interval_secs;
            if ch.fast.push(raw) {
                posted |= TimerMask::FAST_EXPORT_DUE;
            }
            posted |= TimerMask::DISPLAY_REFRESH;
        }
        posted
    }

    /// Copy out and consume the ready half of channel `index`, if any.
    pub fn take_ready_half(&mut self, index: usize) -> Option<[u16; FAST_BUFFER_LEN]> {
        self.channels.get_mut(index)?.fast.take_ready()
    }

    // ── Slow channels ─────────────────────────────────────────

    /// Enabled slow channels whose countdown has run out.
    pub fn due_slow_channels(&self) -> heapless::Vec<usize, CHANNEL_COUNT> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.settings.is_slow() && ch.remaining_secs == 0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Restart channel `index`'s countdown after a measurement.
    pub fn reload(&mut self, index: usize) {
        if let Some(ch) = self.channels.get_mut(index) {
            ch.remaining_secs = ch.settings.interval_secs;
        }
    }

    pub fn has_slow_channel(&self) -> bool {
        self.channels.iter().any(|ch| ch.settings.is_slow())
    }

    /// Pick the next wake-alarm delay (whole minutes, 1..=255) from the
    /// shortest slow countdown and advance every slow countdown by it.
    /// `None` when no slow channel is enabled.
    pub fn schedule_next_alarm(&mut self) -> Option<u8> {
        let shortest = self
            .channels
            .iter()
            .filter(|ch| ch.settings.is_slow())
            .map(|ch| ch.remaining_secs)
            .min()?;
        let minutes = (shortest / 60).clamp(1, 255);
        let elapsed = minutes * 60;
        for ch in self.channels.iter_mut().filter(|ch| ch.settings.is_slow()) {
            ch.remaining_secs = ch.remaining_secs.saturating_sub(elapsed);
        }
        Some(minutes as u8)
    }
}

// ── Conversions ───────────────────────────────────────────────

/// Average of [`ADC_AVERAGE_SAMPLES`] conversions on `channel`.
pub fn average_conversion(adc: &mut (impl AdcPort + ?Sized), channel: u8) -> u16 {
    let sum: u32 = (0..ADC_AVERAGE_SAMPLES)
        .map(|_| u32::from(adc.convert(channel)))
        .sum();
    (sum / ADC_AVERAGE_SAMPLES) as u16
}

/// Supply voltage in millivolts from a raw divider reading.
pub fn supply_millivolts(raw: u16) -> u16 {
    (u32::from(raw) * 13_880 / 1024) as u16
}

/// Loop pressure in bar from a raw 4–20 mA reading.
pub fn pressure_bar(raw: u16) -> f32 {
    f32::from(raw) / 39.3216 - 5.0
}
