//! Foreground scheduler context.
//!
//! The single foreground loop owns a [`Scheduler`] that wraps the
//! interrupt-shared [`SharedState`].  Interrupt handlers only post bits and
//! decrement counters; everything that waits goes through
//! [`Scheduler::wait_for_event_with_timeout`], the one blocking primitive.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Foreground loop                         │
//! │                                                              │
//! │   AppService::run_once ──▶ handler ──▶ bus / controller      │
//! │                                │                             │
//! │                                ▼                             │
//! │               wait_for_event_with_timeout(mask, T)           │
//! │                 │  clear TICK                                │
//! │                 │  idle until TICK or mask                   │
//! │                 └─ repeat ≤ T times ──▶ Signalled | TimedOut │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Because the wait spins on the tick event rather than blocking, new
//! interrupts keep being observed while a handler waits.

use log::debug;

use crate::app::ports::IdlePort;
use crate::events::{CallbackId, EventMask, SharedState, TimerMask};

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// One of the awaited events is pending.
    Signalled,
    /// The timeout elapsed first.
    TimedOut,
}

impl WaitOutcome {
    pub fn is_signalled(self) -> bool {
        self == Self::Signalled
    }
}

/// Handle to the shared scheduler state for the foreground loop.
#[derive(Clone, Copy)]
pub struct Scheduler<'a> {
    shared: &'a SharedState,
}

impl<'a> Scheduler<'a> {
    pub fn new(shared: &'a SharedState) -> Self {
        Self { shared }
    }

    pub fn shared(&self) -> &'a SharedState {
        self.shared
    }

    // ── Event masks ───────────────────────────────────────────

    pub fn post_event(&self, mask: EventMask) {
        self.shared.post_event(mask);
    }

    pub fn clear_event(&self, mask: EventMask) {
        self.shared.clear_event(mask);
    }

    pub fn pending_events(&self) -> EventMask {
        self.shared.pending_events()
    }

    pub fn post_timer_event(&self, mask: TimerMask) {
        self.shared.post_timer_event(mask);
    }

    pub fn clear_timer_event(&self, mask: TimerMask) {
        self.shared.clear_timer_event(mask);
    }

    pub fn pending_timer_events(&self) -> TimerMask {
        self.shared.pending_timer_events()
    }

    // ── Callback timer ────────────────────────────────────────

    pub fn arm_callback(&self, id: CallbackId, delay_ms: u16) {
        debug!("Scheduler: armed callback 0x{:02X} in {} ms", id.bits(), delay_ms);
        self.shared.arm_callback(id, delay_ms);
    }

    pub fn disarm_callback(&self, id: CallbackId) {
        self.shared.disarm_callback(id);
    }

    pub fn armed_callbacks(&self) -> CallbackId {
        self.shared.armed_callbacks()
    }

    // ── Blocking primitives ───────────────────────────────────

    /// Block until any bit of `mask` is pending or `timeout_ms` ticks have
    /// elapsed.  A zero timeout returns [`WaitOutcome::TimedOut`] at once.
    pub fn wait_for_event_with_timeout(
        &self,
        mask: EventMask,
        timeout_ms: u32,
        idle: &mut (impl IdlePort + ?Sized),
    ) -> WaitOutcome {
        let wake = mask | EventMask::TICK;
        for _ in 0..timeout_ms {
            self.shared.clear_event(EventMask::TICK);
            while !self.shared.pending_events().intersects(wake) {
                idle.wait_for_interrupt();
            }
            if self.shared.pending_events().intersects(mask) {
                return WaitOutcome::Signalled;
            }
        }
        WaitOutcome::TimedOut
    }

    /// Spin for `ms` ticks.
    pub fn sleep_ms(&self, ms: u32, idle: &mut (impl IdlePort + ?Sized)) {
        let _ = self.wait_for_event_with_timeout(EventMask::NONE, ms, idle);
    }
}
