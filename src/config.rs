//! Immutable configuration threaded through the compilation pipeline.
//!
//! Per the Design Notes, global state is represented as a single config
//! handle built once and passed down as `Arc<Config>` rather than scattered
//! statics or thread-locals.

use std::sync::Arc;

/// Target instruction-set width for codegen. BPF-side values are always
/// represented as 64-bit regardless of this setting (see codegen memory
/// classes); this only affects user/kernel pointer-read helper selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// Build-once, read-only configuration for a compile+run session.
#[derive(Debug, Clone)]
pub struct Config {
    /// SPDX license string embedded in the generated BPF object (GPL-only
    /// helpers require a GPL-compatible license).
    pub license: String,
    pub arch: Arch,
    /// Stack-allocation threshold (bytes) above which a scratch value spills
    /// to a per-CPU scratch map instead of living on the BPF stack.
    pub on_stack_limit: usize,
    /// Max bytes captured for a `str()` argument.
    pub max_strlen: usize,
    /// Max bytes captured for `cat()`.
    pub max_cat_bytes: usize,
    /// Number of 4KiB pages backing the perf/ring output buffer.
    pub perf_rb_pages: usize,
    /// Reject constructs that can't be proven safe ahead of time (e.g.
    /// unbounded loops without `unroll`).
    pub safe_mode: bool,
    /// Emit verbose `CreateDebugOutput`-style trace_printk calls alongside
    /// generated code.
    pub debug_output: bool,
}

/// Largest CPU id the generated code will index scratch arrays with. Must
/// always be one less than a power of two so the verifier can prove the
/// bitwise-AND mask bounds every access.
pub const MAX_CPU_ID: u32 = 255;

impl Default for Config {
    fn default() -> Self {
        Self {
            license: "GPL".to_string(),
            arch: Arch::X86_64,
            on_stack_limit: 512,
            max_strlen: 64,
            max_cat_bytes: 4096,
            perf_rb_pages: 64,
            safe_mode: false,
            debug_output: false,
        }
    }
}

impl Config {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder(Self::default())
    }
}

/// Fluent builder for the handful of fields callers typically override.
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.0.license = license.into();
        self
    }

    pub fn arch(mut self, arch: Arch) -> Self {
        self.0.arch = arch;
        self
    }

    pub fn on_stack_limit(mut self, bytes: usize) -> Self {
        self.0.on_stack_limit = bytes;
        self
    }

    pub fn safe_mode(mut self, enabled: bool) -> Self {
        self.0.safe_mode = enabled;
        self
    }

    pub fn debug_output(mut self, enabled: bool) -> Self {
        self.0.debug_output = enabled;
        self
    }

    pub fn build(self) -> Arc<Config> {
        Arc::new(self.0)
    }
}
