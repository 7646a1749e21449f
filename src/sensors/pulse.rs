//! Pulse counter input.
//!
//! Sampled once per millisecond from the tick ISR.  A falling edge starts
//! the debounce timer; the pulse is counted only if the input is still low
//! when the timer runs out, so glitches and contact bounce shorter than
//! the debounce time are discarded.
//!
//! ```text
//!  level  ‾‾‾‾‾‾\_/‾‾‾‾‾‾‾‾‾‾‾‾\___________________/‾‾‾‾
//!               │ glitch       │◀─ debounce ─▶│
//!               └ dropped      └ armed         └ counted
//! ```

/// Default debounce time after a falling edge.
pub const DEFAULT_DEBOUNCE_MS: u8 = 50;

#[derive(Debug, Clone, Copy)]
pub struct PulseInput {
    count: u16,
    /// Last confirmed level.
    last_level: bool,
    hold_ms: u8,
    debounce_ms: u8,
}

impl Default for PulseInput {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseInput {
    pub const fn new() -> Self {
        Self {
            count: 0,
            last_level: true,
            hold_ms: 0,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }

    pub fn set_debounce_ms(&mut self, ms: u8) {
        self.debounce_ms = ms;
    }

    /// Feed the current input level.  Returns `true` when a pulse was
    /// counted.
    pub fn sample(&mut self, level: bool) -> bool {
        if self.hold_ms > 0 {
            self.hold_ms -= 1;
            if self.hold_ms == 0 && !level && self.last_level {
                self.last_level = false;
                return self.count_pulse();
            }
            return false;
        }
        if level == self.last_level {
            return false;
        }
        if level {
            self.last_level = true;
            return false;
        }
        if self.debounce_ms == 0 {
            self.last_level = false;
            return self.count_pulse();
        }
        self.hold_ms = self.debounce_ms;
        false
    }

    /// Saturates at `u16::MAX`; a saturated counter reports nothing.
    fn count_pulse(&mut self) -> bool {
        if self.count == u16::MAX {
            return false;
        }
        self.count += 1;
        true
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    /// Remove `committed` pulses, keeping any that arrived since they were read.
    pub fn consume(&mut self, committed: u16) {
        self.count = self.count.saturating_sub(committed);
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.hold_ms = 0;
    }
}
