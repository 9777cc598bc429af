//! Bit clock derived from the configured baud rate.

use super::ModelError;
use crate::sim::Ps;

/// Picoseconds per second.
const PS_PER_SEC: u64 = 1_000_000_000_000;

/// Fixed sampling clock for one model instance.
///
/// The period is set once at construction; dynamic baud-rate changes are
/// not supported.
#[derive(Debug, Clone, Copy)]
pub struct BitClock {
    period: Ps,
}

impl BitClock {
    /// Derive the bit period from a baud rate in bits per second.
    pub fn from_baudrate(baudrate: u32) -> Result<Self, ModelError> {
        if baudrate == 0 {
            return Err(ModelError::InvalidBaudRate);
        }
        Ok(Self {
            period: PS_PER_SEC / baudrate as u64,
        })
    }

    /// One bit time in picoseconds.
    pub fn period(&self) -> Ps {
        self.period
    }

    /// Half a bit time, used to offset the sampling grid to bit centers.
    pub fn half_period(&self) -> Ps {
        self.period / 2
    }
}
