//! Interrupt-shared state and interrupt entry points.
//!
//! Events are produced by:
//! - the 1 ms timer ISR (tick, callback countdown, fast sampling, pulse input)
//! - the enclosure switch and RTC alarm pin-change ISRs
//! - the UART receive ISR (complete response lines)
//! - the foreground loop itself
//!
//! ```text
//! ┌──────────────┐      ┌────────────────────────┐      ┌──────────────┐
//! │ Timer ISR    │─────▶│                        │      │              │
//! │ Pin ISRs     │─────▶│  SharedState           │◀────▶│  Scheduler   │
//! │ UART RX ISR  │─────▶│  (critical sections)   │      │  (foreground)│
//! └──────────────┘      └────────────────────────┘      └──────────────┘
//! ```
//!
//! Pending work is a pair of bitmasks rather than a queue: posting is
//! idempotent and each bit is cleared only by the handler that consumed it.
//! Every mutation happens inside `critical_section::with`, so the same
//! methods are safe from ISR and foreground context.

use core::cell::{Cell, RefCell};
use core::ops::{BitOr, BitOrAssign};

use critical_section::Mutex;

use crate::app::ports::TickHardware;
use crate::controller::link::SerialRx;
use crate::sensors::SensorBank;

macro_rules! bitmask {
    ($(#[$meta:meta])* $name:ident { $($(#[$cmeta:meta])* $flag:ident = $bit:expr,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u8);

        impl $name {
            pub const NONE: Self = Self(0);
            $($(#[$cmeta])* pub const $flag: Self = Self($bit);)*

            pub const fn from_bits(bits: u8) -> Self {
                Self(bits)
            }

            pub const fn bits(self) -> u8 {
                self.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// All bits of `other` are set.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0 && other.0 != 0
            }

            /// Any bit of `other` is set.
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub const fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

bitmask! {
    /// Pending foreground work.
    EventMask {
        /// 1 ms timer tick.
        TICK = 0x01,
        /// The one-shot callback countdown reached zero.
        TIMER_CALLBACK = 0x02,
        ENCLOSURE_OPENED = 0x04,
        ENCLOSURE_CLOSED = 0x08,
        KEY_CHANGED = 0x10,
        /// RTC countdown timer expired.
        WAKE_ALARM = 0x20,
        /// A complete line arrived from the storage controller.
        MESSAGE_RECEIVED = 0x40,
        PULSE_DETECTED = 0x80,
    }
}

bitmask! {
    /// Pending periodic timer requests.
    TimerMask {
        DISPLAY_REFRESH = 0x40,
        /// A fast-sample half is ready for export.
        FAST_EXPORT_DUE = 0x80,
    }
}

bitmask! {
    /// Identifiers of deferred timer callbacks.
    CallbackId {
        /// Switch the pulse indicator off again.
        CLEAR_PULSE_INDICATOR = 0x01,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CallbackTimer {
    ids: CallbackId,
    countdown_ms: u16,
}

#[derive(Debug, Clone, Copy, Default)]
struct Uptime {
    millis: u16,
    seconds: u32,
}

/// State shared between interrupt handlers and the foreground loop.
///
/// Constructed in a `static` on target; host tests create one per test.
pub struct SharedState {
    events: Mutex<Cell<EventMask>>,
    timer_events: Mutex<Cell<TimerMask>>,
    callback: Mutex<Cell<CallbackTimer>>,
    uptime: Mutex<Cell<Uptime>>,
    serial: Mutex<RefCell<SerialRx>>,
    sensors: Mutex<RefCell<SensorBank>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            events: Mutex::new(Cell::new(EventMask::NONE)),
            timer_events: Mutex::new(Cell::new(TimerMask::NONE)),
            callback: Mutex::new(Cell::new(CallbackTimer {
                ids: CallbackId::NONE,
                countdown_ms: 0,
            })),
            uptime: Mutex::new(Cell::new(Uptime {
                millis: 0,
                seconds: 0,
            })),
            serial: Mutex::new(RefCell::new(SerialRx::new())),
            sensors: Mutex::new(RefCell::new(SensorBank::new())),
        }
    }

    // ── Event masks ───────────────────────────────────────────

    pub fn post_event(&self, mask: EventMask) {
        critical_section::with(|cs| {
            let cell = self.events.borrow(cs);
            cell.set(cell.get() | mask);
        });
    }

    pub fn clear_event(&self, mask: EventMask) {
        critical_section::with(|cs| {
            let cell = self.events.borrow(cs);
            cell.set(cell.get().without(mask));
        });
    }

    pub fn pending_events(&self) -> EventMask {
        critical_section::with(|cs| self.events.borrow(cs).get())
    }

    pub fn post_timer_event(&self, mask: TimerMask) {
        critical_section::with(|cs| {
            let cell = self.timer_events.borrow(cs);
            cell.set(cell.get() | mask);
        });
    }

    pub fn clear_timer_event(&self, mask: TimerMask) {
        critical_section::with(|cs| {
            let cell = self.timer_events.borrow(cs);
            cell.set(cell.get().without(mask));
        });
    }

    pub fn pending_timer_events(&self) -> TimerMask {
        critical_section::with(|cs| self.timer_events.borrow(cs).get())
    }

    // ── Callback timer ────────────────────────────────────────

    /// Arm `id` to fire after `delay_ms`; re-arming overwrites the countdown.
    pub fn arm_callback(&self, id: CallbackId, delay_ms: u16) {
        critical_section::with(|cs| {
            let cell = self.callback.borrow(cs);
            let mut cb = cell.get();
            cb.ids |= id;
            cb.countdown_ms = delay_ms;
            cell.set(cb);
        });
    }

    pub fn disarm_callback(&self, id: CallbackId) {
        critical_section::with(|cs| {
            let cell = self.callback.borrow(cs);
            let mut cb = cell.get();
            cb.ids = cb.ids.without(id);
            if cb.ids.is_empty() {
                cb.countdown_ms = 0;
            }
            cell.set(cb);
        });
    }

    pub fn armed_callbacks(&self) -> CallbackId {
        critical_section::with(|cs| self.callback.borrow(cs).get().ids)
    }

    pub fn callback_countdown_ms(&self) -> u16 {
        critical_section::with(|cs| self.callback.borrow(cs).get().countdown_ms)
    }

    // ── Uptime ────────────────────────────────────────────────

    pub fn uptime_secs(&self) -> u32 {
        critical_section::with(|cs| self.uptime.borrow(cs).get().seconds)
    }

    // ── Shared buffers ────────────────────────────────────────

    pub fn with_serial<R>(&self, f: impl FnOnce(&mut SerialRx) -> R) -> R {
        critical_section::with(|cs| f(&mut self.serial.borrow_ref_mut(cs)))
    }

    pub fn with_sensors<R>(&self, f: impl FnOnce(&mut SensorBank) -> R) -> R {
        critical_section::with(|cs| f(&mut self.sensors.borrow_ref_mut(cs)))
    }

    // ═══════════════════════════════════════════════════════════
    //  Interrupt entry points
    // ═══════════════════════════════════════════════════════════

    /// 1 ms timer interrupt.
    pub fn on_timer_tick(&self, hw: &mut (impl TickHardware + ?Sized)) {
        critical_section::with(|cs| {
            let mut events = self.events.borrow(cs).get() | EventMask::TICK;
            let mut timers = TimerMask::NONE;

            let uptime = self.uptime.borrow(cs);
            let mut up = uptime.get();
            up.millis += 1;
            let second_elapsed = up.millis >= 1000;
            if second_elapsed {
                up.millis = 0;
                up.seconds = up.seconds.wrapping_add(1);
            }
            uptime.set(up);

            let callback = self.callback.borrow(cs);
            let mut cb = callback.get();
            if cb.countdown_ms > 0 {
                cb.countdown_ms -= 1;
                if cb.countdown_ms == 0 {
                    events |= EventMask::TIMER_CALLBACK;
                }
                callback.set(cb);
            }

            let mut sensors = self.sensors.borrow_ref_mut(cs);
            let level = hw.pulse_input_high();
            if sensors.sample_pulse_input(level) {
                events |= EventMask::PULSE_DETECTED;
                timers |= TimerMask::DISPLAY_REFRESH;
            }
            if second_elapsed {
                timers |= sensors.service_fast(hw);
            }

            self.events.borrow(cs).set(events);
            let t = self.timer_events.borrow(cs);
            t.set(t.get() | timers);
        });
    }

    /// Enclosure lid switch changed.
    pub fn on_enclosure_changed(&self, open: bool) {
        self.post_event(if open {
            EventMask::ENCLOSURE_OPENED
        } else {
            EventMask::ENCLOSURE_CLOSED
        });
    }

    /// RTC countdown timer pin.
    pub fn on_wake_alarm(&self) {
        self.post_event(EventMask::WAKE_ALARM);
    }

    pub fn on_key_changed(&self) {
        self.post_event(EventMask::KEY_CHANGED);
    }

    /// UART receive interrupt; `line_error` flags framing/overrun errors.
    pub fn on_serial_byte(&self, byte: u8, line_error: bool) {
        critical_section::with(|cs| {
            if line_error {
                return;
            }
            if self.serial.borrow_ref_mut(cs).push(byte) {
                let cell = self.events.borrow(cs);
                cell.set(cell.get() | EventMask::MESSAGE_RECEIVED);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{AdcPort, BoardInputPort};

    struct Quiet;

    impl AdcPort for Quiet {
        fn convert(&mut self, _channel: u8) -> u16 {
            0
        }
    }

    impl BoardInputPort for Quiet {
        fn pulse_input_high(&mut self) -> bool {
            true
        }
        fn enclosure_open(&mut self) -> bool {
            false
        }
        fn reset_cause(&mut self) -> u8 {
            0
        }
    }

    #[test]
    fn posting_is_idempotent() {
        let s = SharedState::new();
        s.post_event(EventMask::WAKE_ALARM);
        s.post_event(EventMask::WAKE_ALARM);
        assert_eq!(s.pending_events(), EventMask::WAKE_ALARM);
        s.clear_event(EventMask::WAKE_ALARM);
        assert!(s.pending_events().is_empty());
    }

    #[test]
    fn clear_leaves_other_bits() {
        let s = SharedState::new();
        s.post_event(EventMask::TICK | EventMask::KEY_CHANGED);
        s.clear_event(EventMask::TICK);
        assert_eq!(s.pending_events(), EventMask::KEY_CHANGED);
    }

    #[test]
    fn callback_fires_once_after_countdown() {
        let s = SharedState::new();
        s.arm_callback(CallbackId::CLEAR_PULSE_INDICATOR, 3);
        let mut hw = Quiet;
        for _ in 0..2 {
            s.on_timer_tick(&mut hw);
        }
        assert!(!s.pending_events().contains(EventMask::TIMER_CALLBACK));
        s.on_timer_tick(&mut hw);
        assert!(s.pending_events().contains(EventMask::TIMER_CALLBACK));
        assert!(s.armed_callbacks().contains(CallbackId::CLEAR_PULSE_INDICATOR));

        s.clear_event(EventMask::TIMER_CALLBACK);
        s.on_timer_tick(&mut hw);
        assert!(!s.pending_events().contains(EventMask::TIMER_CALLBACK));
    }

    #[test]
    fn rearming_overwrites_countdown() {
        let s = SharedState::new();
        s.arm_callback(CallbackId::CLEAR_PULSE_INDICATOR, 5);
        s.arm_callback(CallbackId::CLEAR_PULSE_INDICATOR, 100);
        assert_eq!(s.callback_countdown_ms(), 100);
        s.disarm_callback(CallbackId::CLEAR_PULSE_INDICATOR);
        assert!(s.armed_callbacks().is_empty());
    }

    #[test]
    fn uptime_counts_seconds() {
        let s = SharedState::new();
        let mut hw = Quiet;
        for _ in 0..2500 {
            s.on_timer_tick(&mut hw);
        }
        assert_eq!(s.uptime_secs(), 2);
    }

    #[test]
    fn complete_line_posts_message_event() {
        let s = SharedState::new();
        for &b in b"!00" {
            s.on_serial_byte(b, false);
        }
        assert!(!s.pending_events().contains(EventMask::MESSAGE_RECEIVED));
        s.on_serial_byte(crate::controller::link::TERMINATOR, false);
        assert!(s.pending_events().contains(EventMask::MESSAGE_RECEIVED));
        assert_eq!(s.with_serial(|rx| rx.message_count()), 1);
    }

    #[test]
    fn line_errors_are_discarded() {
        let s = SharedState::new();
        s.on_serial_byte(b'x', true);
        assert_eq!(s.with_serial(|rx| rx.len()), 0);
    }
}
