//! Line-oriented serial link to the storage controller.
//!
//! The UART RX ISR appends bytes to [`SerialRx`]; a terminator closes a
//! line and posts [`EventMask::MESSAGE_RECEIVED`].  The foreground
//! [`Link`] consumes complete lines in order through a read cursor.
//!
//! ```text
//!  SerialRx.buf   "uALFAT 2.05\r!00\r$0000001A\r!0"
//!                  └─ line 0 ──┘└ 1 ┘└─ line 2 ─┘└ partial
//!  Link.consumed = 1  ──▶ next receive() returns "!00"
//! ```

use log::warn;

use crate::app::ports::{IdlePort, SerialPort};
use crate::error::ControllerError;
use crate::events::EventMask;
use crate::scheduler::{Scheduler, WaitOutcome};

/// Line terminator (carriage return).
pub const TERMINATOR: u8 = 0x0D;
/// Receive buffer capacity in bytes.
pub const RX_CAPACITY: usize = 200;
/// Longest line returned to callers; longer lines are truncated.
pub const LINE_CAPACITY: usize = 64;

pub type Line = heapless::Vec<u8, LINE_CAPACITY>;

/// ISR-side receive buffer.  Append-only until flushed, so a placed
/// terminator is never overwritten.
#[derive(Debug, Clone)]
pub struct SerialRx {
    buf: heapless::Vec<u8, RX_CAPACITY>,
    /// Complete lines in `buf`.
    messages: u8,
    /// Offset just past the last terminator.
    line_start: usize,
    overflowed: bool,
}

impl Default for SerialRx {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialRx {
    pub const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            messages: 0,
            line_start: 0,
            overflowed: false,
        }
    }

    /// Append one received byte.  Returns `true` when it completed a line.
    /// Empty lines are dropped.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.overflowed {
            return false;
        }
        if byte == TERMINATOR {
            if self.buf.len() == self.line_start {
                return false;
            }
            if self.buf.push(TERMINATOR).is_err() {
                self.overflowed = true;
                return false;
            }
            self.messages = self.messages.saturating_add(1);
            self.line_start = self.buf.len();
            return true;
        }
        if self.buf.push(byte).is_err() {
            self.overflowed = true;
        }
        false
    }

    /// Line `index` (0-based) without its terminator.
    pub fn message(&self, index: u8) -> Option<&[u8]> {
        if index >= self.messages {
            return None;
        }
        self.buf[..self.line_start]
            .split(|&b| b == TERMINATOR)
            .nth(usize::from(index))
    }

    pub fn message_count(&self) -> u8 {
        self.messages
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn flush(&mut self) {
        *self = Self::new();
    }
}

/// Foreground side of the link.
#[derive(Debug, Default)]
pub struct Link {
    consumed: u8,
}

impl Link {
    pub const fn new() -> Self {
        Self { consumed: 0 }
    }

    /// Discard everything received so far.
    pub fn flush(&mut self, sched: &Scheduler<'_>) {
        sched.shared().with_serial(SerialRx::flush);
        sched.clear_event(EventMask::MESSAGE_RECEIVED);
        self.consumed = 0;
    }

    /// Mark every complete line received so far as consumed.
    pub fn skip_pending(&mut self, sched: &Scheduler<'_>) {
        self.consumed = sched.shared().with_serial(|rx| rx.message_count());
    }

    pub fn transmit_line(&mut self, hw: &mut (impl SerialPort + ?Sized), text: &str) {
        self.transmit_raw(hw, text.as_bytes());
        hw.transmit(TERMINATOR);
    }

    pub fn transmit_raw(&mut self, hw: &mut (impl SerialPort + ?Sized), bytes: &[u8]) {
        for &b in bytes {
            hw.transmit(b);
        }
    }

    /// Next unconsumed line, waiting up to `timeout_ms` for it.
    pub fn receive(
        &mut self,
        sched: &Scheduler<'_>,
        idle: &mut (impl IdlePort + ?Sized),
        timeout_ms: u32,
    ) -> Result<Line, ControllerError> {
        if let Some(line) = self.take_next(sched)? {
            return Ok(line);
        }
        sched.clear_event(EventMask::MESSAGE_RECEIVED);
        // a line may have completed between the check and the clear
        if let Some(line) = self.take_next(sched)? {
            return Ok(line);
        }
        match sched.wait_for_event_with_timeout(EventMask::MESSAGE_RECEIVED, timeout_ms, idle) {
            WaitOutcome::Signalled => {
                sched.clear_event(EventMask::MESSAGE_RECEIVED);
                self.take_next(sched)?.ok_or(ControllerError::NoResponse)
            }
            WaitOutcome::TimedOut => Err(ControllerError::NoResponse),
        }
    }

    fn take_next(&mut self, sched: &Scheduler<'_>) -> Result<Option<Line>, ControllerError> {
        let consumed = self.consumed;
        let next = sched.shared().with_serial(|rx| {
            if rx.overflowed() {
                return Err(ControllerError::RxOverflow);
            }
            Ok(rx.message(consumed).map(|m| {
                let keep = m.len().min(LINE_CAPACITY);
                let mut line = Line::new();
                let _ = line.extend_from_slice(&m[..keep]);
                line
            }))
        })?;
        if next.is_some() {
            self.consumed += 1;
        }
        Ok(next)
    }
}

/// Check a status line: `!00` is success, `!hh` is device error `hh`.
pub fn parse_status(line: &[u8]) -> Result<(), ControllerError> {
    match line {
        [b'!', b'0', b'0', ..] => Ok(()),
        [b'!', hi, lo, ..] => match (hex_digit(*hi), hex_digit(*lo)) {
            (Some(h), Some(l)) => Err(ControllerError::Device(h << 4 | l)),
            _ => {
                warn!("Link: malformed status line");
                Err(ControllerError::MalformedResponse)
            }
        },
        _ => Err(ControllerError::MalformedResponse),
    }
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}
