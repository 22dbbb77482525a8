//! Sized types and struct fields used by the type & field analyser.

use std::collections::BTreeMap;

/// A value's size and, for aggregates, its field layout. Deliberately flat
/// compared to a full type system: the analyser only needs enough shape
/// information to compute scratch-buffer sizes and codegen load/store
/// widths.
#[derive(Debug, Clone, PartialEq)]
pub enum SizedType {
    Void,
    Bool,
    Int { bits: u8, signed: bool },
    Pointer(Box<SizedType>),
    /// Fixed-size byte buffer, as produced by `str()`/`buf()`.
    Buffer(usize),
    Record(Record),
    Tuple(Vec<SizedType>),
    Array { elem: Box<SizedType>, len: usize },
}

impl SizedType {
    pub fn size_of(&self) -> usize {
        match self {
            SizedType::Void => 0,
            SizedType::Bool => 1,
            SizedType::Int { bits, .. } => (*bits as usize).div_ceil(8),
            SizedType::Pointer(_) => 8,
            SizedType::Buffer(n) => *n,
            SizedType::Record(r) => r.size,
            SizedType::Tuple(fields) => fields.iter().map(SizedType::size_of).sum(),
            SizedType::Array { elem, len } => elem.size_of() * len,
        }
    }

    pub fn u64() -> Self {
        SizedType::Int { bits: 64, signed: false }
    }

    pub fn i64() -> Self {
        SizedType::Int { bits: 64, signed: true }
    }
}

/// Which side of the kernel/user boundary a record's bytes live on, for the
/// `bpf_probe_read_kernel`/`bpf_probe_read_user` choice codegen has to make
/// when it loads a field out of it. `None` is for records that never need a
/// probe-read at all (e.g. a synthetic tuple type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Kernel,
    User,
    None,
}

/// One field of a kernel/user-space struct, as resolved from BTF/DWARF.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub offset: usize,
    pub ty: SizedType,
    /// Bit offset/width within the containing byte for bitfield members;
    /// `None` for ordinary fields.
    pub bitfield: Option<(u8, u8)>,
    /// True for a tracepoint's `__data_loc`-style dynamic string field: the
    /// raw value is a 32-bit `(len << 16) | offset` pair relative to the
    /// tracepoint's context, not the string data itself.
    pub is_data_loc: bool,
}

impl Field {
    /// Decode parameters for a bitfield member: `(read_bytes, access_rshift,
    /// mask)`, consumed by codegen to emit one aligned load of `read_bytes`
    /// followed by `(raw >> access_rshift) & mask`. `None` for a field with
    /// no bit-packing.
    pub fn bitfield_decode(&self) -> Option<(usize, u8, u64)> {
        let (access_rshift, bit_width) = self.bitfield?;
        let read_bytes = self.ty.size_of().max(1);
        let mask = crate::codegen::inline_helpers::bitfield_mask(bit_width);
        Some((read_bytes, access_rshift, mask))
    }
}

/// A named aggregate type (e.g. `struct task_struct`).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub size: usize,
    pub fields: Vec<Field>,
    pub address_space: AddressSpace,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A catalog of known records, populated from BTF/DWARF in production and
/// from literal definitions in tests. Kept as a trait object so the type
/// analyser doesn't need to depend on a concrete debug-info parser, the same
/// seam `PlatformOps` draws between BPF runtime logic and the hosting
/// environment.
pub trait StructRegistry {
    fn lookup(&self, name: &str) -> Option<&Record>;
}

/// In-memory `StructRegistry` for tests and scripted catalogs.
#[derive(Debug, Default)]
pub struct StaticStructRegistry {
    records: BTreeMap<String, Record>,
}

impl StaticStructRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) -> &mut Self {
        self.records.insert(record.name.clone(), record);
        self
    }
}

impl StructRegistry for StaticStructRegistry {
    fn lookup(&self, name: &str) -> Option<&Record> {
        self.records.get(name)
    }
}
