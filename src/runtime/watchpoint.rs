//! Watchpoint controller.
//!
//! A watchpoint probe watches a memory address/register for reads,
//! writes, or execution in a *running* process rather than compiling a
//! kprobe/uprobe into the target. Attaching one means momentarily
//! stopping the tracee (`SIGSTOP`), installing the hardware watchpoint via
//! a debug-register write (represented here as the abstract
//! `WatchpointTarget`, since the actual `ptrace(PTRACE_POKEUSER, ...)` call
//! is platform-specific and out of this crate's scope per spec Non-goals),
//! then resuming it (`SIGCONT`). `AsyncWatchpoint` probes skip the stop
//! entirely and rely on the kernel's own page-fault-based watchpoint
//! instead, so they never touch `nix::sys::signal`.
//!
//! Feature-gated behind `watchpoint` since tracee signal control is a
//! capability a sandboxed or CI build may not want to link.

use std::collections::BTreeMap;
use std::sync::Mutex;

#[cfg(feature = "watchpoint")]
use nix::sys::signal::{self, Signal};
#[cfg(feature = "watchpoint")]
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Read,
    Write,
    ReadWrite,
    Execute,
}

impl WatchMode {
    pub fn from_letters(s: &str) -> Option<Self> {
        match s {
            "r" => Some(Self::Read),
            "w" => Some(Self::Write),
            "rw" => Some(Self::ReadWrite),
            "x" => Some(Self::Execute),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchpointTarget {
    pub pid: i32,
    pub address: u64,
    pub len: u8,
    pub mode: WatchMode,
}

#[derive(Debug)]
pub enum Error {
    AlreadyWatched(u64),
    NotWatched(u64),
    #[cfg(feature = "watchpoint")]
    Signal(nix::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyWatched(addr) => write!(f, "address {:#x} is already watched", addr),
            Self::NotWatched(addr) => write!(f, "address {:#x} is not watched", addr),
            #[cfg(feature = "watchpoint")]
            Self::Signal(e) => write!(f, "signal delivery failed: {}", e),
        }
    }
}

impl std::error::Error for Error {}

static WATCHED: Mutex<BTreeMap<u64, WatchpointTarget>> = Mutex::new(BTreeMap::new());

/// Stop the tracee, register the watchpoint, resume the tracee. The
/// address is the lookup key: `bpftrace` only allows one watchpoint per
/// address at a time.
pub fn register(target: WatchpointTarget) -> Result<(), Error> {
    let mut watched = WATCHED.lock().unwrap();
    if watched.contains_key(&target.address) {
        return Err(Error::AlreadyWatched(target.address));
    }

    stop_tracee(target.pid)?;
    watched.insert(target.address, target);
    resume_tracee(target.pid)?;
    Ok(())
}

pub fn unregister(address: u64) -> Result<WatchpointTarget, Error> {
    let mut watched = WATCHED.lock().unwrap();
    let target = watched.remove(&address).ok_or(Error::NotWatched(address))?;
    // Clearing a live hardware watchpoint also requires a stop/resume
    // pair in a real ptrace-backed implementation; the debug-register
    // write itself is out of scope here (see module doc).
    Ok(target)
}

pub fn is_watched(address: u64) -> bool {
    WATCHED.lock().unwrap().contains_key(&address)
}

pub fn watched_count() -> usize {
    WATCHED.lock().unwrap().len()
}

#[cfg(feature = "watchpoint")]
fn stop_tracee(pid: i32) -> Result<(), Error> {
    signal::kill(Pid::from_raw(pid), Signal::SIGSTOP).map_err(Error::Signal)
}

#[cfg(feature = "watchpoint")]
fn resume_tracee(pid: i32) -> Result<(), Error> {
    signal::kill(Pid::from_raw(pid), Signal::SIGCONT).map_err(Error::Signal)
}

#[cfg(not(feature = "watchpoint"))]
fn stop_tracee(_pid: i32) -> Result<(), Error> {
    Ok(())
}

#[cfg(not(feature = "watchpoint"))]
fn resume_tracee(_pid: i32) -> Result<(), Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(address: u64) -> WatchpointTarget {
        WatchpointTarget { pid: std::process::id() as i32, address, len: 8, mode: WatchMode::ReadWrite }
    }

    #[test]
    fn register_then_unregister_round_trips() {
        let t = target(0x1000_0000_0000_0001);
        register(t).unwrap();
        assert!(is_watched(t.address));
        unregister(t.address).unwrap();
        assert!(!is_watched(t.address));
    }

    #[test]
    fn double_register_same_address_is_rejected() {
        let t = target(0x1000_0000_0000_0002);
        register(t).unwrap();
        let err = register(t).unwrap_err();
        assert!(matches!(err, Error::AlreadyWatched(_)));
        unregister(t.address).unwrap();
    }

    #[test]
    fn watch_mode_parses_letter_codes() {
        assert_eq!(WatchMode::from_letters("r"), Some(WatchMode::Read));
        assert_eq!(WatchMode::from_letters("rw"), Some(WatchMode::ReadWrite));
        assert_eq!(WatchMode::from_letters("bogus"), None);
    }
}
