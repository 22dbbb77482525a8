//! Persisted, self-contained runtime metadata record.
//!
//! Grounded on `required_resources.h`: everything the async-action
//! dispatcher needs to decode events and everything the map layer needs to
//! recreate maps, gathered into one struct so a compiled program can be
//! loaded and run without re-parsing the script that produced it. The
//! original serializes this with `cereal`; here it's `serde`/`serde_json`,
//! a like-for-like swap of one generic reflection-based serializer for
//! another (see SPEC_FULL §1.1).

use crate::ast::map_info::MapInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Runtime error kinds that can be reported through an async `runtime_error`
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeErrorId {
    DivideByZero,
    HelperError,
}

/// Severity a `printf`-family call was compiled with (`ERROR` routes to
/// stderr instead of stdout at dispatch time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintfSeverity {
    None,
    Error,
}

/// One frame of source-location context, as attached to runtime-error and
/// printf call sites for user-facing error messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLocation {
    pub filename: String,
    pub line: u32,
    pub column: u32,
    pub source_context: String,
}

/// A chain of source locations (call site plus its ancestry through
/// subprog inlining), mirroring `SourceInfo`'s walk up the parent chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    pub locations: Vec<SourceLocation>,
}

/// Metadata resolved for one in-BPF runtime error emission site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeErrorInfo {
    pub error_id: RuntimeErrorId,
    pub func_id: u32,
    pub source: SourceInfo,
}

/// One compiled `printf`/`errorf` call site's argument schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintfArgs {
    pub format: String,
    pub fields: Vec<crate::codegen::FieldSchema>,
    pub severity: PrintfSeverity,
    pub source: SourceInfo,
}

/// Self-contained metadata a runtime needs to execute a compiled program:
/// map definitions, every async-action argument schema, scratch-buffer
/// sizing, and the flags the resource analyser computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequiredResources {
    pub printf_args: Vec<PrintfArgs>,
    pub system_args: Vec<PrintfArgs>,
    pub cat_args: Vec<PrintfArgs>,
    pub join_args: Vec<PrintfArgs>,
    pub time_args: Vec<PrintfArgs>,
    pub strftime_args: Vec<PrintfArgs>,
    pub cgroup_path_args: Vec<PrintfArgs>,
    pub non_map_print_args: Vec<PrintfArgs>,
    pub skboutput_args: Vec<PrintfArgs>,

    pub max_fmtstring_args_size: usize,
    pub max_tuple_size: usize,
    pub max_read_map_value_size: usize,
    pub max_write_map_value_size: usize,
    pub max_variable_size: usize,
    pub max_map_key_size: usize,

    pub runtime_error_info: BTreeMap<u32, RuntimeErrorInfo>,
    pub maps_info: BTreeMap<String, MapInfo>,
    pub global_vars_ro_size: usize,
    pub global_vars_rw_size: usize,

    pub using_skboutput: bool,
    pub needs_elapsed_map: bool,
    pub needs_join_map: bool,
    pub need_recursion_check: bool,

    pub probe_ids: Vec<String>,
    pub special_probes: Vec<String>,
    pub benchmark_probes: Vec<String>,
    pub watchpoint_probes: Vec<String>,
    pub probes_using_usym: Vec<String>,
}

/// Errors from (de)serializing a `RequiredResources` record.
#[derive(Debug)]
pub enum PersistError {
    Serialize(serde_json::Error),
    Deserialize(serde_json::Error),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialize(e) => write!(f, "failed to serialize required resources: {}", e),
            Self::Deserialize(e) => write!(f, "failed to deserialize required resources: {}", e),
        }
    }
}

impl std::error::Error for PersistError {}

impl RequiredResources {
    /// Serialize to JSON. Not forward-compatible across schema changes (no
    /// version field), matching the original's `save_state` NB.
    pub fn to_json(&self) -> Result<String, PersistError> {
        serde_json::to_string(self).map_err(PersistError::Serialize)
    }

    pub fn from_json(data: &str) -> Result<Self, PersistError> {
        serde_json::from_str(data).map_err(PersistError::Deserialize)
    }
}
