//! External input bridge: feeds bytes from a real input stream into the
//! RX path.
//!
//! The bridge is an OS thread living outside the simulated-time domain.
//! For each byte read it waits (on the RX condvar) until no frame is in
//! flight, injects the byte under the lock, then raises a cross-domain
//! wake so the sampling coordinator starts ticking even if the scheduler
//! is blocked idle. End of input terminates the thread; dropping its
//! wake sender is what lets an otherwise-idle simulation finish.

use super::encoder::RxPath;
use crate::sim::ComponentId;
use crossbeam_channel::Sender;
use log::{debug, warn};
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct InputBridge;

impl InputBridge {
    /// Spawn the bridge thread reading bytes from `input`.
    ///
    /// `target` is the component woken through `wake` after each
    /// injection.
    pub fn spawn<R>(
        input: R,
        rx: Arc<RxPath>,
        target: ComponentId,
        wake: Sender<ComponentId>,
    ) -> std::io::Result<JoinHandle<()>>
    where
        R: Read + Send + 'static,
    {
        thread::Builder::new()
            .name("uart-input".into())
            .spawn(move || Self::run(input, rx, target, wake))
    }

    fn run<R: Read>(mut input: R, rx: Arc<RxPath>, target: ComponentId, wake: Sender<ComponentId>) {
        let mut buf = [0u8; 1];
        loop {
            match input.read(&mut buf) {
                Ok(0) => {
                    debug!("input stream closed, stopping bridge");
                    return;
                }
                Ok(_) => {
                    rx.wait_idle_and_inject(buf[0]);
                    if wake.send(target).is_err() {
                        // Scheduler already gone.
                        return;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("input read failed, stopping bridge: {e}");
                    return;
                }
            }
        }
    }
}
