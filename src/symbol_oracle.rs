//! Narrow interface over live kernel/binary symbol enumeration.
//!
//! Production builds back this with BTF/`/proc/kallsyms`/`nm`-derived
//! catalogs; tests back it with a `StaticSymbolOracle` populated with literal
//! lists. This is the same seam the teacher drew with `PlatformOps` around
//! kernel time/CPU access and with the now-retired `ksym`/`tracepoint`
//! crates: the live symbol tables themselves are external collaborators, but
//! everything that *consumes* them goes through one trait.

use std::collections::BTreeMap;

/// One resolvable symbol: a kernel or user-space function, a tracepoint
/// event, a USDT probe point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    /// Owning module/binary, empty for vmlinux / the main executable.
    pub module: String,
    pub address: u64,
}

/// Abstracts over everything `probe_matcher` needs to know about the live
/// system: which functions exist, which tracepoints are wired up, which BPF
/// programs are already running (for `fentry`/`fexit` target resolution).
pub trait SymbolOracle {
    /// Kernel-space function symbols, optionally restricted to one module.
    fn kernel_functions(&self, module: Option<&str>) -> Vec<Symbol>;
    /// User-space function symbols exported by a binary/shared library path,
    /// or by the given PID's mapped binaries when `pid.is_some()`.
    fn user_functions(&self, target: &str, pid: Option<i32>) -> Vec<Symbol>;
    /// Tracepoint events available under `tracefs`, as `subsystem:event`.
    fn tracepoints(&self) -> Vec<String>;
    /// Raw tracepoint names (bare, no subsystem prefix).
    fn raw_tracepoints(&self) -> Vec<String>;
    /// Attachable `fentry`/`fexit` target names; when `bpf_prog` is true,
    /// restricts to symbols of currently-running BPF programs.
    fn fentry_targets(&self, bpf_prog: bool) -> Vec<String>;
    /// Resolve a shared library's on-disk path the way `bcc_procutils_which_so`
    /// would: search `pid`'s mapped libraries (or the default library path
    /// when `pid` is `None`) for `lib<name>.so`.
    fn resolve_shared_library(&self, name: &str, pid: Option<i32>) -> Option<String>;
}

/// In-memory oracle for tests and scripted environments.
#[derive(Debug, Default)]
pub struct StaticSymbolOracle {
    pub kernel: Vec<Symbol>,
    pub user: BTreeMap<String, Vec<Symbol>>,
    pub tracepoints: Vec<String>,
    pub raw_tracepoints: Vec<String>,
    pub fentry: Vec<String>,
    pub libraries: BTreeMap<String, String>,
}

impl StaticSymbolOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel_function(mut self, name: impl Into<String>, address: u64) -> Self {
        self.kernel.push(Symbol { name: name.into(), module: String::new(), address });
        self
    }

    pub fn with_user_function(mut self, target: impl Into<String>, name: impl Into<String>, address: u64) -> Self {
        let target = target.into();
        self.user.entry(target.clone()).or_default().push(Symbol {
            name: name.into(),
            module: target,
            address,
        });
        self
    }

    pub fn with_tracepoint(mut self, name: impl Into<String>) -> Self {
        self.tracepoints.push(name.into());
        self
    }
}

impl SymbolOracle for StaticSymbolOracle {
    fn kernel_functions(&self, module: Option<&str>) -> Vec<Symbol> {
        match module {
            None => self.kernel.clone(),
            Some(m) => self.kernel.iter().filter(|s| s.module == m).cloned().collect(),
        }
    }

    fn user_functions(&self, target: &str, _pid: Option<i32>) -> Vec<Symbol> {
        self.user.get(target).cloned().unwrap_or_default()
    }

    fn tracepoints(&self) -> Vec<String> {
        self.tracepoints.clone()
    }

    fn raw_tracepoints(&self) -> Vec<String> {
        self.raw_tracepoints.clone()
    }

    fn fentry_targets(&self, _bpf_prog: bool) -> Vec<String> {
        self.fentry.clone()
    }

    fn resolve_shared_library(&self, name: &str, _pid: Option<i32>) -> Option<String> {
        self.libraries.get(name).cloned()
    }
}
