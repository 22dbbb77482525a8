//! Code generation: turns a resource-analysed AST into a concrete BPF
//! instruction stream plus the side tables the runtime needs to load and
//! run it.
//!
//! Per the Design Notes, this does **not** bind to LLVM. The teacher
//! (`runtime.rs`) already manipulates raw BPF instructions byte-for-byte
//! (the `ld_imm64` map-fd relocation patcher, the ELF `maps`/`.rel*` section
//! parser); `ir_builder` generalizes that from "patch an externally-compiled
//! ELF" to "assemble the instruction stream directly," keeping the minimal
//! interface the Design Notes ask for (new basic block, insert call, insert
//! load/store) without an `llvm-sys`/`inkwell` dependency.

pub mod globalvars;
pub mod inline_helpers;
pub mod ir_builder;
pub mod scoped_expr;
pub mod visitor;

pub use globalvars::GlobalVars;
pub use ir_builder::{BpfInsn, CodegenResources, IrBuilder, MapRelocation};
pub use scoped_expr::ScopedExpr;

use serde::{Deserialize, Serialize};

/// One argument's decode schema for an async-action event (printf, join,
/// cat, ...). Mirrors the original's `Field` entries inside
/// `RequiredResources`' arg-schema tuples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    pub is_signed: bool,
    pub is_string: bool,
    /// `(access_rshift, bit_width)` for a bitfield member; `None` for a
    /// field that occupies its whole aligned load.
    pub bitfield: Option<(u8, u8)>,
}
