//! Portability analyser: flags constructs that can't be compiled ahead of
//! time (AOT) for a target other than the one they were compiled on.
//!
//! Grounded on `passes/portability_analyser.h`: a handful of targeted
//! visits (positional parameters baked into generated code at compile time,
//! certain builtins/calls that embed host-specific offsets, casts that
//! depend on the host's type layout, attach points that name host-local
//! PIDs) rather than a full walk.

use crate::ast::attach_point::AttachPoint;
use crate::ast::probe::{Expr, Probe, Statement};
use crate::diagnostics::{DiagnosticBag, Level};

/// Builtins whose generated code embeds a value that is only meaningful on
/// the host the script was compiled on (e.g. `cgroup_path` baking in a
/// cgroupfs mount point).
const HOST_SPECIFIC_BUILTINS: &[&str] = &["cgroup", "ncpus"];
const HOST_SPECIFIC_CALLS: &[&str] = &["cgroup_path", "kaddr"];

pub struct PortabilityAnalyser;

impl PortabilityAnalyser {
    pub fn analyse(probe: &Probe, diagnostics: &mut DiagnosticBag) {
        for ap in &probe.attach_points {
            Self::visit_attach_point(ap, probe, diagnostics);
        }
        for stmt in &probe.body {
            Self::visit_statement(stmt, diagnostics);
        }
    }

    fn visit_attach_point(ap: &AttachPoint, probe: &Probe, diagnostics: &mut DiagnosticBag) {
        if ap.pid.is_some() {
            diagnostics.add_with_hint(
                probe.node,
                Level::Warning,
                format!("attach point '{}' pins a host-local PID", ap.raw),
                "ahead-of-time compiled programs should resolve PIDs at load time instead",
            );
        }
    }

    fn visit_statement(stmt: &Statement, diagnostics: &mut DiagnosticBag) {
        match stmt {
            Statement::Expr { node, expr } => Self::visit_expr(*node, expr, diagnostics),
            Statement::AssignMap { node, key, value, .. } => {
                if let Some(k) = key {
                    Self::visit_expr(*node, k, diagnostics);
                }
                Self::visit_expr(*node, value, diagnostics);
            }
            Statement::AssignVar { node, value, .. } => Self::visit_expr(*node, value, diagnostics),
            Statement::If { node, cond, then, otherwise } => {
                Self::visit_expr(*node, cond, diagnostics);
                for s in then.iter().chain(otherwise.iter()) {
                    Self::visit_statement(s, diagnostics);
                }
            }
            Statement::While { node, cond, body } => {
                Self::visit_expr(*node, cond, diagnostics);
                for s in body {
                    Self::visit_statement(s, diagnostics);
                }
            }
            Statement::Unroll { body, .. } | Statement::For { body, .. } => {
                for s in body {
                    Self::visit_statement(s, diagnostics);
                }
            }
            Statement::MapDecl { .. }
            | Statement::VarDecl { .. }
            | Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::Return { .. } => {}
        }
    }

    fn visit_expr(node: crate::ast::NodeId, expr: &Expr, diagnostics: &mut DiagnosticBag) {
        match expr {
            Expr::PositionalParameter(_) => {
                diagnostics.add_with_hint(
                    node,
                    Level::Warning,
                    "positional parameter value is baked in at compile time",
                    "re-compile for each target host rather than shipping one AOT binary",
                );
            }
            Expr::Builtin(name) if HOST_SPECIFIC_BUILTINS.contains(&name.as_str()) => {
                diagnostics.add(node, Level::Warning, format!("'{}' is host-specific", name));
            }
            Expr::Call { name, args } => {
                if HOST_SPECIFIC_CALLS.contains(&name.as_str()) {
                    diagnostics.add(node, Level::Warning, format!("'{}' call is host-specific", name));
                }
                for a in args {
                    Self::visit_expr(node, a, diagnostics);
                }
            }
            Expr::Cast { expr, .. } | Expr::UnaryOp { expr, .. } => Self::visit_expr(node, expr, diagnostics),
            Expr::BinaryOp { lhs, rhs, .. } => {
                Self::visit_expr(node, lhs, diagnostics);
                Self::visit_expr(node, rhs, diagnostics);
            }
            Expr::Ternary { cond, then, otherwise } => {
                Self::visit_expr(node, cond, diagnostics);
                Self::visit_expr(node, then, diagnostics);
                Self::visit_expr(node, otherwise, diagnostics);
            }
            Expr::Tuple(items) => items.iter().for_each(|e| Self::visit_expr(node, e, diagnostics)),
            Expr::MapAccess { key, .. } => Self::visit_expr(node, key, diagnostics),
            Expr::FieldAccess { base, .. } => Self::visit_expr(node, base, diagnostics),
            Expr::Integer(_)
            | Expr::String(_)
            | Expr::Boolean(_)
            | Expr::Builtin(_)
            | Expr::Variable(_)
            | Expr::StackCapture(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeId;

    #[test]
    fn positional_parameter_flagged() {
        let probe = Probe {
            node: NodeId(0),
            attach_points: vec![],
            filter: None,
            body: vec![Statement::Expr { node: NodeId(1), expr: Expr::PositionalParameter(1) }],
        };
        let mut diags = DiagnosticBag::new();
        PortabilityAnalyser::analyse(&probe, &mut diags);
        assert_eq!(diags.entries().len(), 1);
        assert_eq!(diags.entries()[0].level, Level::Warning);
    }

    #[test]
    fn clean_probe_has_no_diagnostics() {
        let probe = Probe {
            node: NodeId(0),
            attach_points: vec![],
            filter: None,
            body: vec![Statement::Expr { node: NodeId(1), expr: Expr::Integer(1) }],
        };
        let mut diags = DiagnosticBag::new();
        PortabilityAnalyser::analyse(&probe, &mut diags);
        assert!(diags.is_empty());
    }
}
