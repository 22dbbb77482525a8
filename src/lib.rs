//! tracec: a tracing-script compiler and runtime.
//!
//! Compiles a small probe-oriented DSL (attach points, filters, map
//! aggregations, async actions) into BPF bytecode plus the metadata a
//! runtime needs to load and run it, and provides that runtime: map
//! storage, an async-action dispatcher, attach/watchpoint bookkeeping.
//!
//! # Pipeline
//!
//! Attach-point parsing (`attach_parser`) and wildcard expansion
//! (`probe_matcher`) happen first, then type inference (`type_analyser`),
//! resource analysis (`resource_analyser`), portability checks
//! (`portability`), and finally codegen (`codegen::visitor`) against the
//! `IrBuilder`. `pass_context::run_pipeline` drives all of it, gating on
//! `DiagnosticBag::has_errors()` after each stage.
//!
//! # Features
//!
//! - `runtime` (default) — BPF bytecode execution (`rbpf`), ELF-adjacent
//!   object metadata (`aya-obj`), map storage, the async dispatcher.
//! - `watchpoint` — tracee `SIGSTOP`/`SIGCONT` control for watchpoint
//!   probes, via `nix`.

#[macro_use]
extern crate log;

pub mod ast;
pub mod attach_parser;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod error;
#[cfg(feature = "runtime")]
pub mod maps;
pub mod pass_context;
pub mod pcap;
pub mod portability;
pub mod probe_matcher;
pub mod required_resources;
pub mod resource_analyser;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod symbol_oracle;
pub mod type_analyser;

pub use config::Config;
pub use diagnostics::{Diagnostic, DiagnosticBag};
pub use error::FatalError;
pub use pass_context::{run_pipeline, CompiledProbe, PassContext, PipelineOutcome};
pub use required_resources::RequiredResources;

#[cfg(feature = "runtime")]
pub use maps::{Error as MapError, MapDef};

#[cfg(feature = "runtime")]
pub use runtime::dispatcher::Dispatcher;

/// Initialize process-wide logging for CLI entry points. Library
/// consumers that already configure `log` themselves should not call
/// this; it exists so a `tracec` binary target has a one-line setup path,
/// matching the teacher's own `init()` convention.
pub fn init() {
    info!("tracec initialized");

    #[cfg(feature = "runtime")]
    info!("  - runtime feature enabled: maps, dispatcher, program loading");

    #[cfg(feature = "watchpoint")]
    info!("  - watchpoint feature enabled: tracee signal control");
}
