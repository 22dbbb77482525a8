//! Ring-buffer record layout and the fallback fixed-size-buffer path.
//!
//! Grounded on the teacher's `event.rs` (`TraceEvent`, `init_ringbuf`/
//! `ringbuf_push`/`consume_events`): a fixed-size `repr(C, packed)` record
//! plus a name/event interning table, generalized from "one `TraceEvent`
//! per hypervisor exit" to "one async-action frame per dispatch," with the
//! header carrying the numeric `action_id` the dispatcher switches on
//! instead of a fixed `probe_type` byte.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Every async-action frame starts with this header: which handler decodes
/// the payload that follows, what probe produced it, and when.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub action_id: u64,
    pub probe_id: u64,
    pub timestamp_ns: u64,
    pub cpu_id: u32,
    pub payload_len: u32,
}

#[cfg(target_endian = "big")]
compile_error!("ring buffer record layout assumes little-endian; see DESIGN.md");

/// One fully-assembled frame: header plus its raw, not-yet-decoded payload
/// bytes (format depends on `action_id`, decoded by `runtime::handlers`).
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub enum Error {
    NotInitialized,
    PayloadTooLarge { len: usize, capacity: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "ring buffer not initialized"),
            Self::PayloadTooLarge { len, capacity } => {
                write!(f, "payload of {} bytes exceeds ring buffer capacity of {} bytes", len, capacity)
            }
        }
    }
}

impl std::error::Error for Error {}

/// A single-consumer, multi-producer bounded queue of frames, standing in
/// for the kernel's `BPF_MAP_TYPE_RINGBUF` since this crate's BPF side is
/// an in-process VM rather than a live kernel map. Grounded on the
/// teacher's `FALLBACK_EVENTS`/`RINGBUF_FD` pair, simplified to always use
/// the fallback path since there is no second, kernel-backed ring here.
pub struct RingBuffer {
    capacity_bytes: usize,
    frames: Mutex<std::collections::VecDeque<Frame>>,
    dropped: AtomicU64,
}

impl RingBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self { capacity_bytes, frames: Mutex::new(std::collections::VecDeque::new()), dropped: AtomicU64::new(0) }
    }

    pub fn push(&self, header: FrameHeader, payload: Vec<u8>) -> Result<(), Error> {
        if payload.len() + std::mem::size_of::<FrameHeader>() > self.capacity_bytes {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(Error::PayloadTooLarge { len: payload.len(), capacity: self.capacity_bytes });
        }
        self.frames.lock().unwrap().push_back(Frame { header, payload });
        Ok(())
    }

    /// Pop every currently-queued frame, oldest first.
    pub fn drain(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().drain(..).collect()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interns probe/event names so frame headers can carry a small integer id
/// instead of repeating strings, mirroring the teacher's `NAME_TABLE`/
/// `EVENT_NAME_MAP` pair.
#[derive(Debug, Default)]
pub struct NameTable {
    names: Mutex<BTreeMap<u64, String>>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: u64, name: impl Into<String>) {
        self.names.lock().unwrap().insert(id, name.into());
    }

    pub fn get(&self, id: u64) -> Option<String> {
        self.names.lock().unwrap().get(&id).cloned()
    }
}
