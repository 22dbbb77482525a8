//! Fatal, user-facing errors returned from pipeline and runtime entry points.
//!
//! Diagnostics attached to individual AST nodes (`diagnostics::DiagnosticBag`)
//! cover the common case of "this script is malformed." `FatalError` is for
//! the smaller set of conditions that abort the whole run: a probe target
//! that can't be resolved at all, a safe-mode violation, a watchpoint that
//! the kernel refuses to arm.

use std::fmt;

/// Errors that abort compilation or attachment outright rather than being
/// recorded as a per-node diagnostic.
#[derive(Debug)]
pub enum FatalError {
    /// No BTF/DWARF type information available for a field access that
    /// needs it.
    MissingBtf(String),
    /// The watchpoint controller failed to arm a hardware breakpoint.
    WatchpointAttachFailed { addr: u64, reason: String },
    /// A construct was rejected under `Config::safe_mode`.
    SafeModeViolation(String),
    /// An attach point's provider/target could not be matched to any live
    /// symbol.
    NoMatchingProbes(String),
    /// Required resource accounting overflowed a fixed-size limit (e.g. too
    /// many distinct printf format strings).
    ResourceLimitExceeded(String),
    /// Propagated failure from map creation, ELF parsing, or BPF program
    /// loading.
    Runtime(String),
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBtf(what) => write!(f, "no type information for '{}'", what),
            Self::WatchpointAttachFailed { addr, reason } => {
                write!(f, "failed to attach watchpoint at {:#x}: {}", addr, reason)
            }
            Self::SafeModeViolation(what) => write!(f, "rejected in safe mode: {}", what),
            Self::NoMatchingProbes(spec) => write!(f, "no probes match '{}'", spec),
            Self::ResourceLimitExceeded(what) => write!(f, "resource limit exceeded: {}", what),
            Self::Runtime(what) => write!(f, "runtime error: {}", what),
        }
    }
}

impl std::error::Error for FatalError {}
