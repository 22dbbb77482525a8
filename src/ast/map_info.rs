//! Map declaration and resource-accounting metadata.
//!
//! `MapDeclInfo` models `bpf_map_type, int` pairs the resource analyser
//! tracks per declared map name (e.g. `@counts[comm] = count()`);
//! `MapInfo` is the richer, serializable record that ends up inside
//! `RequiredResources`.

use serde::{Deserialize, Serialize};

/// The aggregation function (or lack thereof) a map was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BpfMapType {
    Hash,
    PerCpuHash,
    LruHash,
    LruPerCpuHash,
    Array,
    PerCpuArray,
    StackTrace,
    /// Plain scalar-valued map, e.g. a declared-but-unaggregated `@var`.
    Scalar,
}

/// Per-map-name bookkeeping produced by `resource_analyser` and consumed by
/// codegen and the runtime's map-creation step.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDeclInfo {
    pub bpf_type: BpfMapType,
    /// Assigned at first sight, in declaration order; used as the numeric
    /// map id embedded in generated code.
    pub id: u32,
}

/// Serializable per-map record stored in `RequiredResources::maps_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapInfo {
    pub name: String,
    pub bpf_type: BpfMapType,
    pub key_size: u32,
    pub value_size: u32,
    pub max_entries: u32,
}
