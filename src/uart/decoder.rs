//! TX frame decoder: reconstructs bytes from the chip's serial line.
//!
//! The decoder watches edges on the from-chip line and, once the
//! sampling coordinator is ticking, reads one bit per tick. A frame is
//! start bit (0), 8 data bits LSB-first, stop bit (1). Completed bytes
//! go to the configured sinks: an optional console echo, an optional raw
//! binary log file, and an optional in-memory capture buffer.

use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

/// Decoder phase within one UART frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxPhase {
    /// Line idle; waiting for a falling start edge.
    WaitStart,
    /// Assembling the 8 data bits.
    Sampling,
    /// Byte complete; waiting for the stop bit.
    WaitStop,
}

/// Decoder for the chip-to-model serial line.
pub struct TxDecoder {
    phase: TxPhase,
    /// Last value seen on the line, updated on every edge.
    line: u8,
    /// Data bits assembled so far, first-received bit at the bottom.
    shift: u8,
    bits: u8,
    echo_stdout: bool,
    tx_file: Option<File>,
    capture: Option<Arc<Mutex<Vec<u8>>>>,
}

impl TxDecoder {
    pub fn new(echo_stdout: bool, tx_file: Option<File>) -> Self {
        Self {
            phase: TxPhase::WaitStart,
            line: 1,
            shift: 0,
            bits: 0,
            echo_stdout,
            tx_file,
            capture: None,
        }
    }

    /// Attach an in-memory sink receiving every decoded byte.
    pub fn set_capture(&mut self, capture: Arc<Mutex<Vec<u8>>>) {
        self.capture = Some(capture);
    }

    /// Record an edge on the monitored line.
    ///
    /// Returns `true` when the edge is an accepted start bit, meaning
    /// the coordinator must begin periodic sampling aligned to this
    /// edge.
    pub fn on_line_edge(&mut self, value: u8) -> bool {
        self.line = value;
        if self.phase == TxPhase::WaitStart && value == 0 {
            trace!("received start bit");
            self.phase = TxPhase::Sampling;
            self.bits = 0;
            return true;
        }
        false
    }

    /// Sample the line once; called by the coordinator every bit period
    /// while the decoder is active.
    pub fn on_sample_tick(&mut self) {
        trace!("sampling bit (value: {})", self.line);
        match self.phase {
            TxPhase::WaitStart => {}
            TxPhase::Sampling => {
                self.shift = (self.shift >> 1) | (self.line << 7);
                self.bits += 1;
                if self.bits == 8 {
                    self.emit_byte();
                    trace!("waiting for stop bit");
                    self.phase = TxPhase::WaitStop;
                }
            }
            TxPhase::WaitStop => {
                if self.line == 1 {
                    trace!("received stop bit");
                    self.phase = TxPhase::WaitStart;
                } else {
                    // The source model has no recovery path here; it
                    // keeps sampling until the line goes high. Surface
                    // the anomaly but keep the same behavior.
                    warn!("invalid stop bit (value: 0), staying in stop-bit wait");
                }
            }
        }
    }

    /// Whether the decoder still needs sampling ticks.
    pub fn active(&self) -> bool {
        self.phase != TxPhase::WaitStart
    }

    fn emit_byte(&mut self) {
        let byte = self.shift;
        debug!("sampled TX byte (value: {byte:#04x})");
        if self.echo_stdout {
            let mut out = io::stdout();
            let _ = out.write_all(&[byte]);
            let _ = out.flush();
        }
        if let Some(file) = &mut self.tx_file {
            if let Err(e) = file.write_all(&[byte]) {
                warn!("TX log write failed: {e}");
            }
        }
        if let Some(capture) = &self.capture {
            capture.lock().push(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder_with_capture() -> (TxDecoder, Arc<Mutex<Vec<u8>>>) {
        let mut decoder = TxDecoder::new(false, None);
        let capture = Arc::new(Mutex::new(Vec::new()));
        decoder.set_capture(capture.clone());
        (decoder, capture)
    }

    /// Run one well-formed frame through the decoder: start edge, eight
    /// sampled data bits, stop bit.
    fn feed_frame(decoder: &mut TxDecoder, byte: u8) {
        assert!(decoder.on_line_edge(0));
        for i in 0..8 {
            decoder.on_line_edge((byte >> i) & 1);
            decoder.on_sample_tick();
        }
        decoder.on_line_edge(1);
        decoder.on_sample_tick();
    }

    #[test]
    fn test_decodes_byte_lsb_first() {
        let (mut decoder, capture) = decoder_with_capture();
        feed_frame(&mut decoder, 0x41);
        assert_eq!(capture.lock().as_slice(), &[0x41]);
        assert!(!decoder.active());
    }

    #[test]
    fn test_decodes_all_byte_values() {
        let (mut decoder, capture) = decoder_with_capture();
        for b in 0..=255u8 {
            feed_frame(&mut decoder, b);
        }
        let got = capture.lock();
        assert_eq!(got.len(), 256);
        assert!(got.iter().enumerate().all(|(i, &b)| b == i as u8));
    }

    #[test]
    fn test_start_edge_only_accepted_when_idle() {
        let (mut decoder, _capture) = decoder_with_capture();
        assert!(decoder.on_line_edge(0));
        // Further falling values mid-frame are data, not a new start.
        assert!(!decoder.on_line_edge(1));
        assert!(!decoder.on_line_edge(0));
    }

    #[test]
    fn test_high_line_while_idle_is_ignored() {
        let (mut decoder, _capture) = decoder_with_capture();
        assert!(!decoder.on_line_edge(1));
        assert!(!decoder.active());
    }

    #[test]
    fn test_invalid_stop_bit_keeps_decoder_active() {
        let (mut decoder, capture) = decoder_with_capture();
        assert!(decoder.on_line_edge(0));
        for _ in 0..8 {
            decoder.on_line_edge(0);
            decoder.on_sample_tick();
        }
        assert_eq!(capture.lock().as_slice(), &[0x00]);

        // Line stuck low: no stop bit, decoder keeps waiting.
        decoder.on_sample_tick();
        assert!(decoder.active());

        // Once the line recovers, the next sample closes the frame.
        decoder.on_line_edge(1);
        decoder.on_sample_tick();
        assert!(!decoder.active());
    }
}
