//! Integration tests for the runtime: ring buffer framing, dispatch, and
//! attach-point bookkeeping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracec::codegen::visitor::AsyncActionId;
use tracec::required_resources::RequiredResources;
use tracec::runtime::attach;
use tracec::runtime::dispatcher::Dispatcher;
use tracec::runtime::ring_buffer::{FrameHeader, RingBuffer};

fn header(action: AsyncActionId, payload_len: u32) -> FrameHeader {
    FrameHeader { action_id: action as u64, probe_id: 7, timestamp_ns: 123, cpu_id: 0, payload_len }
}

#[test]
fn test_ring_buffer_drains_in_fifo_order() {
    let ring = RingBuffer::new(4096);
    ring.push(header(AsyncActionId::Time, 8), vec![1; 8]).unwrap();
    ring.push(header(AsyncActionId::Time, 8), vec![2; 8]).unwrap();
    let frames = ring.drain();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload, vec![1; 8]);
    assert_eq!(frames[1].payload, vec![2; 8]);
}

#[test]
fn test_ring_buffer_rejects_oversized_payload() {
    let ring = RingBuffer::new(16);
    let err = ring.push(header(AsyncActionId::Time, 64), vec![0; 64]);
    assert!(err.is_err());
    assert_eq!(ring.dropped_count(), 1);
}

#[test]
fn test_dispatcher_drain_once_reports_exit_action() {
    let ring = RingBuffer::new(4096);
    ring.push(header(AsyncActionId::Exit, 0), vec![]).unwrap();
    let dispatcher = Dispatcher::new(ring, RequiredResources::default());
    assert!(dispatcher.drain_once());
}

#[test]
fn test_dispatcher_run_until_stops_on_predicate() {
    let ring = RingBuffer::new(4096);
    let dispatcher =
        Dispatcher::new(ring, RequiredResources::default()).with_poll_interval(Duration::from_millis(1));
    let polls = AtomicUsize::new(0);
    dispatcher.run_until(|| polls.fetch_add(1, Ordering::SeqCst) >= 2);
    assert!(polls.load(Ordering::SeqCst) >= 3);
}

#[test]
fn test_attach_then_detach_round_trips() {
    let key = "kprobe:vfs_read#integration_round_trip";
    attach::attach(key.to_string(), 1, "trace_reads".to_string()).unwrap();
    assert!(attach::get_attached(key).is_some());
    let info = attach::detach(key).unwrap();
    assert_eq!(info.program_id, 1);
    assert!(attach::get_attached(key).is_none());
}

#[test]
fn test_double_attach_same_key_is_rejected() {
    let key = "kprobe:vfs_write#integration_double_attach";
    attach::attach(key.to_string(), 1, "p".to_string()).unwrap();
    let err = attach::attach(key.to_string(), 2, "p".to_string()).unwrap_err();
    assert!(matches!(err, attach::Error::AlreadyAttached(_)));
    attach::detach(key).unwrap();
}
