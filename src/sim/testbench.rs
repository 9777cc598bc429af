//! Stimulus and observation components for wire-level tests and demos.

use super::{Component, Event, Ps, SimCtx, WireId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Chip-side transmitter that serializes bytes onto a wire as 10-bit
/// UART frames (start, 8 data bits LSB-first, stop).
///
/// One bit is driven per timer tick; the host seeds the first tick with
/// [`crate::sim::Scheduler::schedule_at`]. After the last scripted bit
/// the wire is left at the idle level (high).
pub struct FrameDriver {
    wire: WireId,
    period: Ps,
    idle_bits: u32,
    bits: VecDeque<u8>,
}

impl FrameDriver {
    /// Create a driver for `wire` with one bit per `period`, inserting
    /// `idle_bits` high bits between frames.
    pub fn new(wire: WireId, period: Ps, idle_bits: u32) -> Self {
        Self {
            wire,
            period,
            idle_bits,
            bits: VecDeque::new(),
        }
    }

    /// Append one framed byte to the script.
    pub fn push_byte(&mut self, byte: u8) {
        self.bits.push_back(0);
        for i in 0..8 {
            self.bits.push_back((byte >> i) & 1);
        }
        self.bits.push_back(1);
        for _ in 0..self.idle_bits {
            self.bits.push_back(1);
        }
    }

    /// Append every byte of `data` to the script.
    pub fn push_bytes(&mut self, data: &[u8]) {
        for &b in data {
            self.push_byte(b);
        }
    }
}

impl Component for FrameDriver {
    fn handle(&mut self, _event: Event, ctx: &mut SimCtx) {
        if let Some(bit) = self.bits.pop_front() {
            ctx.drive(self.wire, bit);
            if !self.bits.is_empty() {
                ctx.schedule_in(self.period);
            }
        }
    }
}

/// Records `(timestamp, value)` for every edge on the wire it listens to.
pub struct EdgeProbe {
    log: Arc<Mutex<Vec<(Ps, u8)>>>,
}

impl EdgeProbe {
    /// Create a probe and the shared buffer its edges land in.
    pub fn new() -> (Self, Arc<Mutex<Vec<(Ps, u8)>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Self { log: log.clone() }, log)
    }
}

impl Component for EdgeProbe {
    fn handle(&mut self, event: Event, ctx: &mut SimCtx) {
        if let Event::Edge { value, .. } = event {
            self.log.lock().push((ctx.now(), value));
        }
    }
}
