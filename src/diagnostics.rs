//! Per-node diagnostics (spec error-handling regime 1).
//!
//! Passes don't abort on the first problem; they record a diagnostic against
//! the offending node and keep walking so a single `tracec` run can report
//! every issue in a script at once. The pipeline driver (`pass_context`)
//! gates on `DiagnosticBag::has_errors()` after each pass before running the
//! next one.

use crate::ast::NodeId;
use std::fmt;

/// Severity of a recorded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Hint,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Hint => write!(f, "hint"),
        }
    }
}

/// A single diagnostic attached to an AST node.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub node: NodeId,
    pub level: Level,
    pub message: String,
    pub hint: Option<String>,
}

/// Collects diagnostics across an entire pipeline run.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    entries: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: NodeId, level: Level, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            node,
            level,
            message: message.into(),
            hint: None,
        });
    }

    pub fn add_with_hint(
        &mut self,
        node: NodeId,
        level: Level,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            node,
            level,
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn error(&mut self, node: NodeId, message: impl Into<String>) {
        self.add(node, Level::Error, message);
    }

    pub fn warning(&mut self, node: NodeId, message: impl Into<String>) {
        self.add(node, Level::Warning, message);
    }

    /// True once at least one `Level::Error` diagnostic has been recorded.
    /// Mirrors the original's `diagnostics.ok()` gate (inverted).
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.level == Level::Error)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == Level::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_gate_trips_only_on_errors() {
        let mut bag = DiagnosticBag::new();
        bag.warning(NodeId(0), "just a warning");
        assert!(!bag.has_errors());
        bag.error(NodeId(1), "boom");
        assert!(bag.has_errors());
        assert_eq!(bag.errors().count(), 1);
    }
}
