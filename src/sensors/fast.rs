//! Ping-pong buffer for fast-sampled channels.
//!
//! ```text
//!            cursor
//!              ▼
//!  half 0  [ s s s s . . . . ]   ◀── active: ISR writes here
//!  half 1  [ r r r r r r r r ]   ◀── ready: exporter copies this out
//! ```
//!
//! When the cursor wraps the just-filled half becomes ready and the other
//! half becomes active, so the writer never touches the half an exporter
//! may be reading.

#[derive(Debug, Clone)]
pub struct FastSampleBuffer<const N: usize> {
    halves: [[u16; N]; 2],
    cursor: usize,
    active: usize,
    ready: Option<usize>,
}

impl<const N: usize> Default for FastSampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FastSampleBuffer<N> {
    pub const fn new() -> Self {
        Self {
            halves: [[0; N]; 2],
            cursor: 0,
            active: 0,
            ready: None,
        }
    }

    /// Store one sample.  Returns `true` when this sample completed a half.
    pub fn push(&mut self, sample: u16) -> bool {
        self.halves[self.active][self.cursor] = sample;
        self.cursor = (self.cursor + 1) % N;
        if self.cursor == 0 {
            self.ready = Some(self.active);
            self.active ^= 1;
            true
        } else {
            false
        }
    }

    pub fn active_half(&self) -> usize {
        self.active
    }

    pub fn ready_half(&self) -> Option<usize> {
        self.ready
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Copy out the ready half and mark it consumed.
    pub fn take_ready(&mut self) -> Option<[u16; N]> {
        self.ready.take().map(|half| self.halves[half])
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
