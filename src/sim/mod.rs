//! Discrete-event simulation substrate.
//!
//! This module provides the virtual-time machinery the device models run
//! on: an event scheduler, binary wires connecting components, and a
//! small testbench toolkit for driving and observing those wires.

mod scheduler;
mod testbench;

pub use scheduler::{Component, ComponentId, Event, Ps, Scheduler, SimCtx, WireId};
pub use testbench::{EdgeProbe, FrameDriver};
