//! Bit-accurate UART model.
//!
//! The model sits between a simulated chip and the outside world,
//! speaking real UART framing (start bit, 8 data bits LSB-first, stop
//! bit) at the granularity of individual signal edges:
//!
//! ```text
//!   chip TX wire ──edges──► TX decoder ──bytes──► stdout / file / capture
//!   chip RX wire ◄──bits─── RX encoder ◄──bytes── input bridge (OS thread)
//! ```
//!
//! # Sampling coordinator
//!
//! Both directions share one periodic sampling loop, driven by the
//! scheduler's virtual clock. The loop has two states:
//!
//! - **idle**: neither path active; no timer outstanding. The model
//!   sleeps until a start edge arrives on the chip TX wire or a wake
//!   reports an injected RX byte.
//! - **running**: a timer fires once per bit period; each tick steps the
//!   TX decoder and/or the RX encoder, whichever is active. When neither
//!   remains active after a tick, no further timer is scheduled.
//!
//! A TX start edge offsets the sampling grid by half a period so ticks
//! land at bit centers; the first data sample then falls one full period
//! after that offset (the start bit itself is never sampled). An RX-only
//! activation ticks at whole-period intervals from the wake. An
//! activation that arrives while the loop is already running simply
//! joins the existing grid.
//!
//! # Time domains
//!
//! All TX state is touched only from the scheduler's thread and needs no
//! locking. The RX frame state is shared with the input bridge thread
//! and lives behind a mutex in [`encoder::RxPath`].

pub mod bridge;
pub mod decoder;
pub mod encoder;
pub mod timing;

use crate::sim::{Component, Event, SimCtx, WireId};
use decoder::TxDecoder;
use encoder::RxPath;
use log::{info, warn};
use parking_lot::Mutex;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use timing::BitClock;

/// Errors raised by the UART model.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The configured baud rate cannot produce a sampling period.
    #[error("invalid baud rate: must be greater than zero")]
    InvalidBaudRate,

    /// A byte was injected while a frame was still in flight.
    #[error("RX path busy: a frame is already in flight")]
    RxBusy,
}

/// Read-only settings for one model instance.
#[derive(Debug, Clone)]
pub struct UartConfig {
    /// Bits per second on both lines.
    pub baudrate: u32,
    /// Mirror every chip TX edge straight onto the chip RX wire.
    pub loopback: bool,
    /// Echo decoded TX bytes to the console.
    pub stdout: bool,
    /// Whether the host should attach an input bridge.
    pub stdin: bool,
    /// Append decoded TX bytes to this file as raw binary.
    pub tx_file: Option<PathBuf>,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baudrate: 115_200,
            loopback: false,
            stdout: false,
            stdin: false,
            tx_file: None,
        }
    }
}

/// The UART model, registered with the scheduler as one component.
///
/// Listens for edges on the chip TX wire and drives the chip RX wire.
pub struct UartModel {
    clock: BitClock,
    loopback: bool,
    rx_wire: WireId,
    decoder: TxDecoder,
    rx: Arc<RxPath>,
    /// Whether a sampling timer is outstanding (the running state).
    ticking: bool,
}

impl UartModel {
    /// Build a model from its configuration.
    ///
    /// `rx_wire` is the model-to-chip line this component will drive.
    /// A TX log file that cannot be opened is reported and skipped; an
    /// invalid baud rate is fatal.
    pub fn new(config: &UartConfig, rx_wire: WireId) -> Result<Self, ModelError> {
        let clock = BitClock::from_baudrate(config.baudrate)?;
        info!(
            "instantiated uart model (baudrate: {}, loopback: {}, stdout: {}, tx_file: {:?})",
            config.baudrate, config.loopback, config.stdout, config.tx_file
        );

        let tx_file = match &config.tx_file {
            Some(path) => match File::create(path) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("unable to open TX log file {}: {e}", path.display());
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            clock,
            loopback: config.loopback,
            rx_wire,
            decoder: TxDecoder::new(config.stdout, tx_file),
            rx: RxPath::new(),
            ticking: false,
        })
    }

    /// The shared RX path, for the input bridge or direct injection.
    pub fn rx_path(&self) -> Arc<RxPath> {
        self.rx.clone()
    }

    /// Attach an in-memory sink receiving every decoded TX byte.
    pub fn set_capture(&mut self, capture: Arc<Mutex<Vec<u8>>>) {
        self.decoder.set_capture(capture);
    }

    /// The sampling period derived from the configured baud rate.
    pub fn clock(&self) -> BitClock {
        self.clock
    }

    /// Leave idle by scheduling the first sampling tick, unless the
    /// loop is already running.
    fn activate(&mut self, ctx: &mut SimCtx, first_delay: u64) {
        if !self.ticking {
            self.ticking = true;
            ctx.schedule_in(first_delay);
        }
    }

    fn on_tx_edge(&mut self, value: u8, ctx: &mut SimCtx) {
        if self.loopback {
            ctx.drive(self.rx_wire, value);
        }
        if self.decoder.on_line_edge(value) {
            // Half-period offset puts every sample at a bit center; the
            // first data bit's center is one period after that.
            let first = self.clock.half_period() + self.clock.period();
            self.activate(ctx, first);
        }
    }

    fn on_wake(&mut self, ctx: &mut SimCtx) {
        if self.rx.is_active() {
            self.activate(ctx, self.clock.period());
        }
    }

    fn on_tick(&mut self, ctx: &mut SimCtx) {
        if self.decoder.active() {
            self.decoder.on_sample_tick();
        }
        if let Some(bit) = self.rx.take_bit() {
            ctx.drive(self.rx_wire, bit);
        }
        if self.decoder.active() || self.rx.is_active() {
            ctx.schedule_in(self.clock.period());
        } else {
            self.ticking = false;
        }
    }
}

impl Component for UartModel {
    fn handle(&mut self, event: Event, ctx: &mut SimCtx) {
        match event {
            Event::Edge { value, .. } => self.on_tx_edge(value, ctx),
            Event::Timer => self.on_tick(ctx),
            Event::Wake => self.on_wake(ctx),
        }
    }
}
