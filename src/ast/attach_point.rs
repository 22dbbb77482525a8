//! Attach point data model, shared by the parser, probe matcher, and
//! resource analyser.

use std::fmt;

/// Provider kind named by the first colon-delimited part of a probe string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeType {
    Begin,
    End,
    Self_,
    Bench,
    Kprobe,
    Kretprobe,
    Uprobe,
    Uretprobe,
    Usdt,
    Tracepoint,
    Profile,
    Interval,
    Watchpoint,
    AsyncWatchpoint,
    Fentry,
    Fexit,
    Iter,
    RawTracepoint,
    Software,
    Hardware,
    Special,
}

impl ProbeType {
    /// Parse the provider name (the text before the first `:`).
    pub fn from_provider(s: &str) -> Option<Self> {
        Some(match s {
            "BEGIN" => Self::Begin,
            "END" => Self::End,
            "self" => Self::Self_,
            "bench" => Self::Bench,
            "kprobe" => Self::Kprobe,
            "kretprobe" => Self::Kretprobe,
            "uprobe" => Self::Uprobe,
            "uretprobe" => Self::Uretprobe,
            "usdt" => Self::Usdt,
            "tracepoint" | "t" => Self::Tracepoint,
            "profile" => Self::Profile,
            "interval" | "i" => Self::Interval,
            "watchpoint" | "w" => Self::Watchpoint,
            "asyncwatchpoint" | "aw" => Self::AsyncWatchpoint,
            "fentry" | "f" => Self::Fentry,
            "fexit" | "fr" => Self::Fexit,
            "iter" => Self::Iter,
            "rawtracepoint" | "rt" => Self::RawTracepoint,
            "software" | "s" => Self::Software,
            "hardware" | "h" => Self::Hardware,
            _ => return None,
        })
    }

    pub fn is_return_probe(&self) -> bool {
        matches!(self, Self::Kretprobe | Self::Uretprobe | Self::Fexit)
    }

    /// Probe types that describe a function/offset and can therefore carry
    /// wildcards that need expansion against live symbols.
    pub fn supports_wildcard_expansion(&self) -> bool {
        matches!(
            self,
            Self::Kprobe
                | Self::Kretprobe
                | Self::Uprobe
                | Self::Uretprobe
                | Self::Tracepoint
                | Self::Usdt
                | Self::RawTracepoint
                | Self::Fentry
                | Self::Fexit
        )
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Begin => "BEGIN",
            Self::End => "END",
            Self::Self_ => "self",
            Self::Bench => "bench",
            Self::Kprobe => "kprobe",
            Self::Kretprobe => "kretprobe",
            Self::Uprobe => "uprobe",
            Self::Uretprobe => "uretprobe",
            Self::Usdt => "usdt",
            Self::Tracepoint => "tracepoint",
            Self::Profile => "profile",
            Self::Interval => "interval",
            Self::Watchpoint => "watchpoint",
            Self::AsyncWatchpoint => "asyncwatchpoint",
            Self::Fentry => "fentry",
            Self::Fexit => "fexit",
            Self::Iter => "iter",
            Self::RawTracepoint => "rawtracepoint",
            Self::Software => "software",
            Self::Hardware => "hardware",
            Self::Special => "special",
        };
        write!(f, "{}", s)
    }
}

/// One fully-parsed (or still-to-be-expanded) attach point.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachPoint {
    pub probe_type: ProbeType,
    /// Module/binary/library name, empty if elided (current process or
    /// kernel default).
    pub target: String,
    /// Function/event/tracepoint name. May still contain `*`/`?` wildcards
    /// before probe-matcher expansion.
    pub func: String,
    /// USDT namespace, empty unless `probe_type == Usdt` with a 4-part spec.
    pub ns: String,
    /// `func+offset` suffix, 0 if absent.
    pub address: Option<u64>,
    pub func_offset: Option<i64>,
    /// PID for uprobe/usdt/watchpoint probes attaching to a running process;
    /// `None` means "elided, resolve against the traced binary path."
    pub pid: Option<i32>,
    /// Sampling frequency for `profile`/`interval` probes (Hz), or the
    /// optional "every Nth event" count for `software`/`hardware` probes —
    /// the two never coexist on one attach point, so they share the slot.
    pub freq: Option<u64>,
    /// Watched register/address width in bytes, for `watchpoint`.
    pub len: Option<u8>,
    /// Watch mode letters (`r`/`w`/`x`) for `watchpoint`.
    pub mode: Option<String>,
    /// Original, unexpanded probe text, kept for diagnostics.
    pub raw: String,
}

impl AttachPoint {
    pub fn new(probe_type: ProbeType, raw: impl Into<String>) -> Self {
        Self {
            probe_type,
            target: String::new(),
            func: String::new(),
            ns: String::new(),
            address: None,
            func_offset: None,
            pid: None,
            freq: None,
            len: None,
            mode: None,
            raw: raw.into(),
        }
    }

    /// True if `func` still contains glob-style wildcard characters.
    pub fn has_wildcard(&self) -> bool {
        self.func.contains('*') || self.func.contains('?')
    }
}
