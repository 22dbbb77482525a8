//! Resource analyser: single AST traversal computing everything the runtime
//! needs to provision before any BPF program is loaded.
//!
//! Grounded on `resource_analyser.h` (map/variable buffer sizing,
//! `maybe_allocate_map_key_buffer`) and `codegen_resources.cpp`
//! (`needs_elapsed_map`/`needs_join_map`/`stackid_maps` flag computation).
//! Produces a `ResourceAnalysis` that `required_resources::RequiredResources`
//! merges into its final, serializable form.

use crate::ast::map_info::{BpfMapType, MapDeclInfo};
use crate::ast::probe::{Expr, Probe, Statement};
use crate::ast::types::SizedType;
use crate::config::Config;
use std::collections::BTreeMap;

/// Stack-capture map variant, keyed by (user-space?, frame limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackType {
    pub user: bool,
    pub limit: u32,
}

/// Accumulated findings from one resource-analysis pass.
#[derive(Debug, Default)]
pub struct ResourceAnalysis {
    pub map_decls: BTreeMap<String, MapDeclInfo>,
    pub needs_elapsed_map: bool,
    pub needs_join_map: bool,
    pub using_skboutput: bool,
    pub need_recursion_check: bool,
    pub stackid_maps: Vec<StackType>,
    pub max_map_key_size: usize,
    pub max_variable_size: usize,
    next_map_id: u32,
}

impl ResourceAnalysis {
    fn allocate_map(&mut self, name: &str, bpf_type: BpfMapType) {
        if self.map_decls.contains_key(name) {
            return;
        }
        let id = self.next_map_id;
        self.next_map_id += 1;
        self.map_decls.insert(name.to_string(), MapDeclInfo { bpf_type, id });
    }
}

/// Runs the resource-analysis pass over one probe's body.
pub struct ResourceAnalyser<'a> {
    config: &'a Config,
}

impl<'a> ResourceAnalyser<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn analyse(&self, probe: &Probe) -> ResourceAnalysis {
        let mut out = ResourceAnalysis::default();
        // Stack-based probes other than BEGIN/END get the recursion guard;
        // BEGIN/END run once and can't recurse.
        out.need_recursion_check = !probe.attach_points.is_empty();

        for stmt in &probe.body {
            self.visit_statement(stmt, &mut out);
        }
        out
    }

    fn visit_statement(&self, stmt: &Statement, out: &mut ResourceAnalysis) {
        match stmt {
            Statement::Expr { expr, .. } => self.visit_expr(expr, out),
            Statement::MapDecl { name, .. } => {
                out.allocate_map(name, BpfMapType::Hash);
            }
            Statement::AssignMap { map, key, value, .. } => {
                out.allocate_map(map, BpfMapType::Hash);
                if let Some(k) = key {
                    self.visit_expr(k, out);
                    out.max_map_key_size = out.max_map_key_size.max(self.approx_size(k));
                }
                self.visit_expr(value, out);
            }
            Statement::AssignVar { value, .. } => {
                self.visit_expr(value, out);
                out.max_variable_size = out.max_variable_size.max(self.approx_size(value));
            }
            Statement::VarDecl { ty, .. } => {
                if let Some(ty) = ty {
                    out.max_variable_size = out.max_variable_size.max(ty.size_of());
                }
            }
            Statement::If { cond, then, otherwise, .. } => {
                self.visit_expr(cond, out);
                for s in then.iter().chain(otherwise.iter()) {
                    self.visit_statement(s, out);
                }
            }
            Statement::While { cond, body, .. } => {
                self.visit_expr(cond, out);
                for s in body {
                    self.visit_statement(s, out);
                }
            }
            Statement::Unroll { body, .. } | Statement::For { body, .. } => {
                for s in body {
                    self.visit_statement(s, out);
                }
            }
            Statement::Break { .. } | Statement::Continue { .. } | Statement::Return { .. } => {}
        }
    }

    fn visit_expr(&self, expr: &Expr, out: &mut ResourceAnalysis) {
        match expr {
            Expr::Builtin(name) => {
                if name == "elapsed" {
                    out.needs_elapsed_map = true;
                }
                if name == "kstack" {
                    out.stackid_maps.push(StackType { user: false, limit: 0 });
                }
                if name == "ustack" {
                    out.stackid_maps.push(StackType { user: true, limit: 0 });
                }
            }
            Expr::Call { name, args } => {
                if name == "join" {
                    out.needs_join_map = true;
                }
                if name == "kstack" {
                    out.stackid_maps.push(StackType { user: false, limit: self.stack_limit(args) });
                }
                if name == "ustack" {
                    out.stackid_maps.push(StackType { user: true, limit: self.stack_limit(args) });
                }
                if name == "skboutput" {
                    out.using_skboutput = true;
                }
                for a in args {
                    self.visit_expr(a, out);
                }
            }
            Expr::MapAccess { key, .. } => self.visit_expr(key, out),
            Expr::Cast { expr, .. } | Expr::UnaryOp { expr, .. } => self.visit_expr(expr, out),
            Expr::Tuple(items) => items.iter().for_each(|e| self.visit_expr(e, out)),
            Expr::BinaryOp { lhs, rhs, .. } => {
                self.visit_expr(lhs, out);
                self.visit_expr(rhs, out);
            }
            Expr::Ternary { cond, then, otherwise } => {
                self.visit_expr(cond, out);
                self.visit_expr(then, out);
                self.visit_expr(otherwise, out);
            }
            Expr::FieldAccess { base, .. } => self.visit_expr(base, out),
            Expr::Integer(_)
            | Expr::String(_)
            | Expr::Boolean(_)
            | Expr::PositionalParameter(_)
            | Expr::Variable(_)
            | Expr::StackCapture(_) => {}
        }
    }

    fn stack_limit(&self, args: &[Expr]) -> u32 {
        args.first()
            .and_then(|a| if let Expr::Integer(n) = a { Some(*n as u32) } else { None })
            .unwrap_or(0)
    }

    fn approx_size(&self, expr: &Expr) -> usize {
        match expr {
            Expr::String(s) => (s.len() + 1).min(self.config.max_strlen),
            Expr::Cast { ty, .. } => ty.size_of(),
            _ => SizedType::u64().size_of(),
        }
    }
}
