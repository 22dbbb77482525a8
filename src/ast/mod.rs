//! The AST data model: attach points, probes, sized types, map declarations.
//!
//! `PassContext` (see `crate::pass_context`) owns the arena: a flat
//! `Vec<Probe>` plus an indexed node table used only for diagnostics
//! attachment. Nodes are referenced by `NodeId`, never freed mid-run, the
//! same "no mid-run deallocation" discipline the original's arena-allocated
//! AST relies on for stable pointers.

pub mod attach_point;
pub mod map_info;
pub mod probe;
pub mod types;

pub use attach_point::{AttachPoint, ProbeType};
pub use map_info::{MapDeclInfo, MapInfo};
pub use probe::{Probe, Statement};
pub use types::{Field, SizedType};

/// Stable index into a `PassContext`'s diagnostic node table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(u32::MAX);
}
