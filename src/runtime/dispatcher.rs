//! Single-threaded blocking dispatch loop.
//!
//! Grounded on the teacher's `event.rs` (`consume_events`/`emit_event`
//! poll-and-dispatch shape), simplified per SPEC_FULL §5: there is exactly
//! one dispatcher per process, so it holds owned state rather than the
//! teacher's global statics. `run_until` polls the ring buffer until the
//! caller's stop predicate is true or a `runtime::handlers::HandlerOutcome::
//! RequestExit` comes back from an `exit()` call.

use crate::required_resources::RequiredResources;
use crate::runtime::handlers::{self, HandlerOutcome};
use crate::runtime::ring_buffer::RingBuffer;
use log::info;
use std::time::Duration;

pub struct Dispatcher {
    ring: RingBuffer,
    resources: RequiredResources,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(ring: RingBuffer, resources: RequiredResources) -> Self {
        Self { ring, resources, poll_interval: Duration::from_millis(10) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Drain and dispatch whatever is currently queued, without blocking.
    /// Returns `true` if an `exit()` action was processed.
    pub fn drain_once(&self) -> bool {
        let mut should_exit = false;
        for frame in self.ring.drain() {
            if dispatch_frame(&frame, &self.resources) == HandlerOutcome::RequestExit {
                should_exit = true;
            }
        }
        should_exit
    }

    /// Block, polling at `poll_interval`, until `should_stop` returns true
    /// or an `exit()` action fires.
    pub fn run_until(&self, mut should_stop: impl FnMut() -> bool) {
        info!("dispatcher starting");
        loop {
            if self.drain_once() {
                info!("dispatcher stopping: exit() action received");
                break;
            }
            if should_stop() {
                info!("dispatcher stopping: stop predicate satisfied");
                break;
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

fn dispatch_frame(frame: &crate::runtime::ring_buffer::Frame, resources: &RequiredResources) -> HandlerOutcome {
    handlers::dispatch(frame, resources, 0)
}
