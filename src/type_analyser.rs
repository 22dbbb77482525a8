//! Type & field analyser.
//!
//! Walks expressions to assign a `SizedType` to every node that needs one
//! for codegen (map keys/values, variable slots, cast targets) and resolves
//! `FieldAccess` against a `StructRegistry`. DWARF/BTF parsing is out of
//! scope (external collaborator); this pass only consumes whatever catalog
//! it's handed.

use crate::ast::attach_point::ProbeType;
use crate::ast::probe::{Expr, Probe, Statement};
use crate::ast::types::{SizedType, StructRegistry};
use crate::ast::NodeId;
use crate::diagnostics::DiagnosticBag;

/// The receiver record a probe's `args`/`ctx` builtins resolve against,
/// derived once per probe from its first attach point.
struct ProbeContext<'p> {
    record_name: &'p str,
}

/// Resolves expression types for one probe's body, recording diagnostics for
/// unknown fields/records rather than aborting.
pub struct TypeAnalyser<'a> {
    registry: &'a dyn StructRegistry,
}

impl<'a> TypeAnalyser<'a> {
    pub fn new(registry: &'a dyn StructRegistry) -> Self {
        Self { registry }
    }

    pub fn analyse_probe(&self, probe: &Probe, diagnostics: &mut DiagnosticBag) {
        let context = self.probe_context(probe);
        for stmt in &probe.body {
            self.analyse_statement(stmt, context.as_ref(), diagnostics);
        }
    }

    /// The record name a context-access builtin resolves against: a
    /// tracepoint's `subsystem:event` name, a kprobe/uprobe/fentry's target
    /// function name, and so on. Probes with no addressable context
    /// (`BEGIN`/`END`/`interval`/`profile`/...) get `None`.
    fn probe_context<'p>(&self, probe: &'p Probe) -> Option<ProbeContext<'p>> {
        let ap = probe.attach_points.first()?;
        match ap.probe_type {
            ProbeType::Tracepoint
            | ProbeType::Kprobe
            | ProbeType::Kretprobe
            | ProbeType::Uprobe
            | ProbeType::Uretprobe
            | ProbeType::Usdt
            | ProbeType::Fentry
            | ProbeType::Fexit
            | ProbeType::RawTracepoint => Some(ProbeContext { record_name: ap.func.as_str() }),
            _ => None,
        }
    }

    fn analyse_statement(&self, stmt: &Statement, ctx: Option<&ProbeContext>, diagnostics: &mut DiagnosticBag) {
        match stmt {
            Statement::Expr { expr, node } => {
                self.infer(expr, *node, ctx, diagnostics);
            }
            Statement::AssignMap { value, node, .. } | Statement::AssignVar { value, node, .. } => {
                self.infer(value, *node, ctx, diagnostics);
            }
            Statement::If { cond, then, otherwise, node } => {
                self.infer(cond, *node, ctx, diagnostics);
                for s in then.iter().chain(otherwise.iter()) {
                    self.analyse_statement(s, ctx, diagnostics);
                }
            }
            Statement::While { cond, body, node } => {
                self.infer(cond, *node, ctx, diagnostics);
                for s in body {
                    self.analyse_statement(s, ctx, diagnostics);
                }
            }
            Statement::Unroll { body, .. } | Statement::For { body, .. } => {
                for s in body {
                    self.analyse_statement(s, ctx, diagnostics);
                }
            }
            Statement::MapDecl { .. }
            | Statement::VarDecl { .. }
            | Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::Return { .. } => {}
        }
    }

    /// Infer the `SizedType` of an expression, recording a diagnostic and
    /// falling back to a safe default when a builtin/field can't be
    /// resolved. `node` is the enclosing statement, used to attach any
    /// diagnostic raised while inferring a sub-expression of it.
    pub fn infer(
        &self,
        expr: &Expr,
        node: NodeId,
        ctx: Option<&ProbeContext>,
        diagnostics: &mut DiagnosticBag,
    ) -> SizedType {
        match expr {
            Expr::Integer(_) => SizedType::i64(),
            Expr::Boolean(_) => SizedType::Bool,
            Expr::String(s) => SizedType::Buffer(s.len() + 1),
            Expr::PositionalParameter(_) => SizedType::u64(),
            Expr::Builtin(name) => self.builtin_type(name, node, ctx, diagnostics),
            Expr::Variable(_) => SizedType::u64(),
            Expr::MapAccess { key, .. } => {
                self.infer(key, node, ctx, diagnostics);
                SizedType::u64()
            }
            Expr::Cast { ty, expr } => {
                self.infer(expr, node, ctx, diagnostics);
                ty.clone()
            }
            Expr::Tuple(items) => {
                SizedType::Tuple(items.iter().map(|e| self.infer(e, node, ctx, diagnostics)).collect())
            }
            Expr::BinaryOp { lhs, rhs, .. } => {
                self.infer(lhs, node, ctx, diagnostics);
                self.infer(rhs, node, ctx, diagnostics);
                SizedType::i64()
            }
            Expr::UnaryOp { expr, .. } => self.infer(expr, node, ctx, diagnostics),
            Expr::Ternary { then, .. } => self.infer(then, node, ctx, diagnostics),
            Expr::Call { name, args } => {
                for a in args {
                    self.infer(a, node, ctx, diagnostics);
                }
                self.call_return_type(name)
            }
            Expr::StackCapture(_) => SizedType::Buffer(8 * 127),
            Expr::FieldAccess { base, field } => {
                let base_ty = self.infer(base, node, ctx, diagnostics);
                self.resolve_field(&base_ty, field, node, diagnostics)
            }
        }
    }

    fn builtin_type(
        &self,
        name: &str,
        node: NodeId,
        ctx: Option<&ProbeContext>,
        diagnostics: &mut DiagnosticBag,
    ) -> SizedType {
        match name {
            "pid" | "tid" | "uid" | "gid" | "cpu" => SizedType::Int { bits: 32, signed: false },
            "comm" => SizedType::Buffer(16),
            "nsecs" | "elapsed" => SizedType::u64(),
            "retval" => SizedType::i64(),
            "kstack" | "ustack" => SizedType::Buffer(8 * 127),
            "args" | "ctx" => self.context_record_type(node, ctx, diagnostics),
            _ => SizedType::u64(),
        }
    }

    /// Resolve `args`/`ctx` to the receiver record the probe's attach point
    /// names, consulting the struct registry. A probe with no addressable
    /// context, or one the registry has no layout for, is a diagnostic
    /// rather than a panic — codegen never runs once one's recorded.
    fn context_record_type(
        &self,
        node: NodeId,
        ctx: Option<&ProbeContext>,
        diagnostics: &mut DiagnosticBag,
    ) -> SizedType {
        let Some(ctx) = ctx else {
            diagnostics.error(node, "`args` has no meaning outside a probe with a function or tracepoint context");
            return SizedType::Void;
        };
        match self.registry.lookup(ctx.record_name) {
            Some(rec) => SizedType::Record(rec.clone()),
            None => {
                diagnostics.error(node, format!("no struct layout registered for `{}`", ctx.record_name));
                SizedType::Void
            }
        }
    }

    fn call_return_type(&self, name: &str) -> SizedType {
        match name {
            "str" => SizedType::Buffer(64),
            "buf" => SizedType::Buffer(4096),
            "count" | "sum" | "min" | "max" | "avg" | "hist" | "lhist" => SizedType::u64(),
            _ => SizedType::Void,
        }
    }

    /// Resolve a `.field` access against `base_ty`, which must already have
    /// been inferred to a `Record` (typically `args`/`ctx`). A tracepoint's
    /// `__data_loc` dynamic-string fields are rewritten to a plain 64-bit
    /// integer: the raw value's low 16 bits are already the
    /// context-relative offset a later `bpf_probe_read_str` needs, so no
    /// further decode happens here. A bitfield member's width narrows the
    /// returned integer type to the declared bit width.
    fn resolve_field(&self, base_ty: &SizedType, field: &str, node: NodeId, diagnostics: &mut DiagnosticBag) -> SizedType {
        let SizedType::Record(rec) = base_ty else {
            diagnostics.error(node, format!("field `{}` accessed on a value with no struct layout", field));
            return SizedType::u64();
        };
        let Some(f) = rec.field(field) else {
            diagnostics.error(node, format!("`{}` has no field named `{}`", rec.name, field));
            return SizedType::u64();
        };
        if f.is_data_loc {
            return SizedType::u64();
        }
        if let Some((_read_bytes, _access_rshift, mask)) = f.bitfield_decode() {
            let signed = matches!(f.ty, SizedType::Int { signed: true, .. });
            return SizedType::Int { bits: mask.count_ones().max(1) as u8, signed };
        }
        f.ty.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::attach_point::AttachPoint;
    use crate::ast::types::{AddressSpace, Field, Record, StaticStructRegistry};

    #[test]
    fn integer_literal_is_signed_64() {
        let reg = StaticStructRegistry::new();
        let analyser = TypeAnalyser::new(&reg);
        let mut diags = DiagnosticBag::new();
        assert_eq!(analyser.infer(&Expr::Integer(5), NodeId(0), None, &mut diags), SizedType::i64());
    }

    #[test]
    fn comm_builtin_is_16_byte_buffer() {
        let reg = StaticStructRegistry::new();
        let analyser = TypeAnalyser::new(&reg);
        let mut diags = DiagnosticBag::new();
        assert_eq!(
            analyser.infer(&Expr::Builtin("comm".into()), NodeId(0), None, &mut diags),
            SizedType::Buffer(16)
        );
    }

    fn openat_registry() -> StaticStructRegistry {
        let mut reg = StaticStructRegistry::new();
        reg.insert(Record {
            name: "syscalls:sys_enter_openat".into(),
            size: 24,
            address_space: AddressSpace::Kernel,
            fields: vec![
                Field {
                    name: "dfd".into(),
                    offset: 16,
                    ty: SizedType::Int { bits: 32, signed: true },
                    bitfield: None,
                    is_data_loc: false,
                },
                Field {
                    name: "flags".into(),
                    offset: 20,
                    ty: SizedType::Int { bits: 8, signed: false },
                    bitfield: Some((1, 3)),
                    is_data_loc: false,
                },
                Field {
                    name: "filename".into(),
                    offset: 8,
                    ty: SizedType::u64(),
                    bitfield: None,
                    is_data_loc: true,
                },
            ],
        });
        reg
    }

    fn field_access(field: &str) -> Expr {
        Expr::FieldAccess { base: Box::new(Expr::Builtin("args".into())), field: field.into() }
    }

    #[test]
    fn field_access_resolves_offset_and_type_from_registry() {
        let reg = openat_registry();
        let analyser = TypeAnalyser::new(&reg);
        let ctx = ProbeContext { record_name: "syscalls:sys_enter_openat" };
        let mut diags = DiagnosticBag::new();
        let ty = analyser.infer(&field_access("dfd"), NodeId(0), Some(&ctx), &mut diags);
        assert_eq!(ty, SizedType::Int { bits: 32, signed: true });
        assert!(!diags.has_errors());
    }

    #[test]
    fn bitfield_field_access_narrows_to_declared_width() {
        let reg = openat_registry();
        let analyser = TypeAnalyser::new(&reg);
        let ctx = ProbeContext { record_name: "syscalls:sys_enter_openat" };
        let mut diags = DiagnosticBag::new();
        let ty = analyser.infer(&field_access("flags"), NodeId(0), Some(&ctx), &mut diags);
        assert_eq!(ty, SizedType::Int { bits: 3, signed: false });
    }

    #[test]
    fn data_loc_field_is_rewritten_to_plain_u64() {
        let reg = openat_registry();
        let analyser = TypeAnalyser::new(&reg);
        let ctx = ProbeContext { record_name: "syscalls:sys_enter_openat" };
        let mut diags = DiagnosticBag::new();
        let ty = analyser.infer(&field_access("filename"), NodeId(0), Some(&ctx), &mut diags);
        assert_eq!(ty, SizedType::u64());
    }

    #[test]
    fn unknown_field_on_a_resolved_record_is_a_diagnostic() {
        let reg = openat_registry();
        let analyser = TypeAnalyser::new(&reg);
        let ctx = ProbeContext { record_name: "syscalls:sys_enter_openat" };
        let mut diags = DiagnosticBag::new();
        analyser.infer(&field_access("nonexistent"), NodeId(3), Some(&ctx), &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn args_builtin_outside_a_probe_context_is_a_diagnostic() {
        let reg = openat_registry();
        let analyser = TypeAnalyser::new(&reg);
        let mut diags = DiagnosticBag::new();
        analyser.infer(&Expr::Builtin("args".into()), NodeId(0), None, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn probe_context_is_derived_from_the_first_attach_points_func() {
        let reg = openat_registry();
        let analyser = TypeAnalyser::new(&reg);
        let mut ap = AttachPoint::new(ProbeType::Tracepoint, "tracepoint:syscalls:sys_enter_openat");
        ap.func = "syscalls:sys_enter_openat".into();
        let probe = Probe {
            node: NodeId(0),
            attach_points: vec![ap],
            filter: None,
            body: vec![Statement::Expr { node: NodeId(1), expr: field_access("dfd") }],
        };
        let mut diags = DiagnosticBag::new();
        analyser.analyse_probe(&probe, &mut diags);
        assert!(!diags.has_errors());
    }
}
