//! Virtual-time event scheduler and wire routing.
//!
//! The scheduler owns a set of components (device models, stimulus
//! generators, probes) and a set of binary wires connecting them. Time is
//! a monotonic picosecond counter that jumps from event to event; nothing
//! here waits on the wall clock.
//!
//! # Execution model
//!
//! Components implement [`Component`] and are driven entirely by events:
//!
//! - **Timer**: a delay the component scheduled for itself expired
//! - **Edge**: a wire the component listens on changed value
//! - **Wake**: a producer outside the simulated-time domain signalled it
//!
//! Handlers receive a [`SimCtx`] through which they read the current
//! time, schedule their next timer, and drive wires. Driving a wire is
//! edge-triggered: writing the value already on the wire is a no-op,
//! while a change posts an `Edge` event to the wire's listener at the
//! current timestamp.
//!
//! # Two time domains
//!
//! Everything inside [`Scheduler::run`] lives in virtual time on a single
//! thread, so components need no locking among themselves. Real OS
//! threads (e.g. a console reader) interact with the simulation only
//! through a wake channel: they hold a `Sender<ComponentId>` and each
//! message is delivered to the target component as a `Wake` event at the
//! current virtual timestamp. The run loop blocks on that channel when
//! the event queue is empty and terminates once the queue is drained and
//! every external sender has been dropped.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Simulation time in picoseconds.
pub type Ps = u64;

/// Handle to a registered component.
pub type ComponentId = usize;

/// Handle to a registered wire.
pub type WireId = usize;

/// An event delivered to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A timer scheduled via [`SimCtx::schedule_in`] expired.
    Timer,
    /// A wire this component listens on changed to `value`.
    Edge { wire: WireId, value: u8 },
    /// A wake raised from outside the simulated-time domain.
    Wake,
}

/// A simulated hardware component.
pub trait Component {
    /// Handle one event at the current virtual time.
    fn handle(&mut self, event: Event, ctx: &mut SimCtx);
}

/// A binary signal line with at most one listening component.
struct Wire {
    value: u8,
    listener: Option<ComponentId>,
}

/// An event waiting in the queue.
///
/// Ordered by timestamp, with an insertion sequence number breaking ties
/// so that same-timestamp events dispatch in FIFO order.
struct QueuedEvent {
    at: Ps,
    seq: u64,
    target: ComponentId,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the earliest event first.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Mutable scheduler state shared with component handlers.
struct EventQueue {
    now: Ps,
    seq: u64,
    heap: BinaryHeap<QueuedEvent>,
    wires: Vec<Wire>,
}

impl EventQueue {
    fn post(&mut self, at: Ps, target: ComponentId, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(QueuedEvent {
            at,
            seq,
            target,
            event,
        });
    }

    fn drive(&mut self, wire: WireId, value: u8) {
        let w = &mut self.wires[wire];
        if w.value == value {
            return;
        }
        w.value = value;
        if let Some(listener) = w.listener {
            let now = self.now;
            self.post(now, listener, Event::Edge { wire, value });
        }
    }
}

/// Context handed to a component while it handles an event.
pub struct SimCtx<'a> {
    me: ComponentId,
    queue: &'a mut EventQueue,
}

impl SimCtx<'_> {
    /// Current virtual time in picoseconds.
    pub fn now(&self) -> Ps {
        self.queue.now
    }

    /// Schedule a `Timer` event for this component after `delay`.
    pub fn schedule_in(&mut self, delay: Ps) {
        let at = self.queue.now + delay;
        self.queue.post(at, self.me, Event::Timer);
    }

    /// Drive a wire to `value`, notifying its listener on a change.
    pub fn drive(&mut self, wire: WireId, value: u8) {
        self.queue.drive(wire, value);
    }
}

/// The discrete-event scheduler.
pub struct Scheduler {
    queue: EventQueue,
    components: Vec<Box<dyn Component>>,
    wake_tx: Sender<ComponentId>,
    wake_rx: Receiver<ComponentId>,
}

impl Scheduler {
    /// Create an empty scheduler at time zero.
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = unbounded();
        Self {
            queue: EventQueue {
                now: 0,
                seq: 0,
                heap: BinaryHeap::new(),
                wires: Vec::new(),
            },
            components: Vec::new(),
            wake_tx,
            wake_rx,
        }
    }

    /// Add a wire with the given initial value and return its handle.
    pub fn add_wire(&mut self, initial: u8) -> WireId {
        self.queue.wires.push(Wire {
            value: initial,
            listener: None,
        });
        self.queue.wires.len() - 1
    }

    /// Register a component and return its handle.
    pub fn add_component(&mut self, component: Box<dyn Component>) -> ComponentId {
        self.components.push(component);
        self.components.len() - 1
    }

    /// Make `component` the listener for edges on `wire`.
    pub fn listen(&mut self, wire: WireId, component: ComponentId) {
        self.queue.wires[wire].listener = Some(component);
    }

    /// Seed a `Timer` event for `target` at absolute time `at`.
    ///
    /// Used by hosts to kick off stimulus components; once running,
    /// components schedule themselves through [`SimCtx`].
    pub fn schedule_at(&mut self, at: Ps, target: ComponentId) {
        self.queue.post(at, target, Event::Timer);
    }

    /// A sender that producers outside the simulated-time domain use to
    /// wake a component.
    ///
    /// The run loop stays alive as long as any clone of this sender
    /// exists, so only hand it to producers that eventually terminate.
    pub fn wake_sender(&self) -> Sender<ComponentId> {
        self.wake_tx.clone()
    }

    /// Run the simulation to completion and return the final time.
    ///
    /// The loop ends when the event queue is empty and no external wake
    /// sender remains alive.
    pub fn run(self) -> Ps {
        let Self {
            mut queue,
            mut components,
            wake_tx,
            wake_rx,
        } = self;
        // The scheduler's own sender must not keep the wake channel open.
        drop(wake_tx);

        loop {
            // Wakes that arrived while events were dispatching get the
            // current timestamp.
            while let Ok(id) = wake_rx.try_recv() {
                let now = queue.now;
                queue.post(now, id, Event::Wake);
            }

            let queued = match queue.heap.pop() {
                Some(ev) => ev,
                None => match wake_rx.recv() {
                    Ok(id) => {
                        let now = queue.now;
                        queue.post(now, id, Event::Wake);
                        continue;
                    }
                    // Every producer is gone: nothing can ever be
                    // scheduled again.
                    Err(_) => break,
                },
            };

            queue.now = queued.at;
            let component = &mut components[queued.target];
            let mut ctx = SimCtx {
                me: queued.target,
                queue: &mut queue,
            };
            component.handle(queued.event, &mut ctx);
        }

        queue.now
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every event it receives together with its timestamp.
    struct Recorder {
        log: Arc<Mutex<Vec<(Ps, Event)>>>,
    }

    impl Component for Recorder {
        fn handle(&mut self, event: Event, ctx: &mut SimCtx) {
            self.log.lock().push((ctx.now(), event));
        }
    }

    /// Ticks `n` times at a fixed interval, driving a wire low then high.
    struct Toggler {
        wire: WireId,
        interval: Ps,
        remaining: u32,
    }

    impl Component for Toggler {
        fn handle(&mut self, _event: Event, ctx: &mut SimCtx) {
            ctx.drive(self.wire, (self.remaining % 2) as u8);
            if self.remaining > 0 {
                self.remaining -= 1;
                ctx.schedule_in(self.interval);
            }
        }
    }

    #[test]
    fn test_events_dispatch_in_time_order() {
        let mut sched = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = sched.add_component(Box::new(Recorder { log: log.clone() }));
        sched.schedule_at(300, id);
        sched.schedule_at(100, id);
        sched.schedule_at(200, id);

        let end = sched.run();

        assert_eq!(end, 300);
        let times: Vec<Ps> = log.lock().iter().map(|(t, _)| *t).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    /// Pushes its tag on every event, making dispatch order observable.
    struct Tagged {
        tag: u8,
        log: Arc<Mutex<Vec<u8>>>,
    }

    impl Component for Tagged {
        fn handle(&mut self, _event: Event, _ctx: &mut SimCtx) {
            self.log.lock().push(self.tag);
        }
    }

    #[test]
    fn test_same_timestamp_events_are_fifo() {
        let mut sched = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = sched.add_component(Box::new(Tagged {
            tag: b'a',
            log: log.clone(),
        }));
        let b = sched.add_component(Box::new(Tagged {
            tag: b'b',
            log: log.clone(),
        }));
        sched.schedule_at(50, b);
        sched.schedule_at(50, a);
        sched.schedule_at(50, b);

        sched.run();

        // Insertion order, not component order.
        assert_eq!(log.lock().as_slice(), b"bab");
    }

    #[test]
    fn test_wire_edges_are_change_triggered() {
        let mut sched = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let wire = sched.add_wire(1);
        let probe = sched.add_component(Box::new(Recorder { log: log.clone() }));
        sched.listen(wire, probe);
        let toggler = sched.add_component(Box::new(Toggler {
            wire,
            interval: 10,
            remaining: 3,
        }));
        sched.schedule_at(0, toggler);

        sched.run();

        // remaining = 3,2,1,0 drives 1,0,1,0; the first drive of 1
        // matches the initial wire value and produces no edge.
        let edges: Vec<(Ps, Event)> = log
            .lock()
            .iter()
            .filter(|(_, e)| matches!(e, Event::Edge { .. }))
            .cloned()
            .collect();
        assert_eq!(
            edges,
            vec![
                (10, Event::Edge { wire, value: 0 }),
                (20, Event::Edge { wire, value: 1 }),
                (30, Event::Edge { wire, value: 0 }),
            ]
        );
    }

    #[test]
    fn test_external_wake_reaches_component() {
        let mut sched = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = sched.add_component(Box::new(Recorder { log: log.clone() }));
        let wake = sched.wake_sender();

        let producer = std::thread::spawn(move || {
            wake.send(id).unwrap();
            // Dropping the sender lets the run loop terminate.
        });

        sched.run();
        producer.join().unwrap();

        assert_eq!(log.lock().as_slice(), &[(0, Event::Wake)]);
    }

    #[test]
    fn test_empty_schedule_terminates_immediately() {
        let mut sched = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        sched.add_component(Box::new(Recorder { log: log.clone() }));

        let end = sched.run();

        assert_eq!(end, 0);
        assert!(log.lock().is_empty());
    }
}
