//! Wildcard function-name expansion against live symbols.
//!
//! Grounded on `probe_matcher.cpp`'s `get_matches_for_probetype`/
//! `get_matches_in_stream`: dispatch by `ProbeType` to the right symbol
//! stream (kernel functions, user functions for a target/pid, tracefs
//! events, fentry candidates, ...), then glob-match `func` against that
//! stream. Demangled C++ symbols ending in `.part.N` (compiler-generated
//! partial-inlining clones) are skipped, matching the original's kprobe
//! filtering, since they're never independently traceable.

use crate::ast::attach_point::{AttachPoint, ProbeType};
use crate::symbol_oracle::SymbolOracle;

/// Expand one attach point's wildcarded `func` into the concrete attach
/// points it matches. Non-wildcarded or non-expandable attach points are
/// returned unchanged as a single-element vector.
pub fn expand(ap: &AttachPoint, oracle: &dyn SymbolOracle) -> Vec<AttachPoint> {
    if !ap.probe_type.supports_wildcard_expansion() || !ap.has_wildcard() {
        return vec![ap.clone()];
    }

    let candidates = candidate_names(ap, oracle);
    candidates
        .into_iter()
        .filter(|name| glob_match(&ap.func, name))
        .map(|name| {
            let mut expanded = ap.clone();
            expanded.func = name;
            expanded
        })
        .collect()
}

fn candidate_names(ap: &AttachPoint, oracle: &dyn SymbolOracle) -> Vec<String> {
    match ap.probe_type {
        ProbeType::Kprobe | ProbeType::Kretprobe => oracle
            .kernel_functions(non_empty(&ap.target))
            .into_iter()
            .map(|s| s.name)
            .filter(|n| !is_partial_inline_clone(n))
            .collect(),
        ProbeType::Uprobe | ProbeType::Uretprobe => oracle
            .user_functions(&ap.target, ap.pid)
            .into_iter()
            .map(|s| s.name)
            .collect(),
        ProbeType::Tracepoint => oracle.tracepoints(),
        ProbeType::RawTracepoint => oracle.raw_tracepoints(),
        ProbeType::Fentry | ProbeType::Fexit => oracle.fentry_targets(ap.target == "bpf"),
        ProbeType::Usdt => oracle
            .user_functions(&ap.target, ap.pid)
            .into_iter()
            .map(|s| s.name)
            .collect(),
        _ => Vec::new(),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// gcc/clang emit `.part.N`/`.constprop.N` clones for partially-inlined
/// functions; these aren't independently attachable kprobe targets.
fn is_partial_inline_clone(name: &str) -> bool {
    name.contains(".part.") || name.contains(".constprop.")
}

/// Shell-style glob match supporting `*` (any run) and `?` (single char).
/// No bracket-expression support, matching the subset the original's
/// `get_wildcard_tokens` actually exercises for probe names.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    glob_match_inner(&p, &t)
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            glob_match_inner(rest, text) || (!text.is_empty() && glob_match_inner(pattern, &text[1..]))
        }
        Some(('?', rest)) => !text.is_empty() && glob_match_inner(rest, &text[1..]),
        Some((c, rest)) => match text.split_first() {
            Some((t0, trest)) if t0 == c => glob_match_inner(rest, trest),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol_oracle::StaticSymbolOracle;

    #[test]
    fn glob_star_matches_any_suffix() {
        assert!(glob_match("vfs_*", "vfs_read"));
        assert!(glob_match("vfs_*", "vfs_"));
        assert!(!glob_match("vfs_*", "sys_read"));
    }

    #[test]
    fn glob_question_matches_one_char() {
        assert!(glob_match("tcp_v?_connect", "tcp_v4_connect"));
        assert!(!glob_match("tcp_v?_connect", "tcp_v46_connect"));
    }

    #[test]
    fn expands_kprobe_wildcard_against_oracle() {
        let oracle = StaticSymbolOracle::new()
            .with_kernel_function("vfs_read", 1)
            .with_kernel_function("vfs_write", 2)
            .with_kernel_function("sys_read", 3);

        let mut ap = AttachPoint::new(ProbeType::Kprobe, "kprobe:vfs_*");
        ap.func = "vfs_*".to_string();

        let mut expanded = expand(&ap, &oracle);
        expanded.sort_by(|a, b| a.func.cmp(&b.func));
        let names: Vec<_> = expanded.iter().map(|a| a.func.as_str()).collect();
        assert_eq!(names, vec!["vfs_read", "vfs_write"]);
    }

    #[test]
    fn non_wildcard_passes_through_unexpanded() {
        let oracle = StaticSymbolOracle::new();
        let mut ap = AttachPoint::new(ProbeType::Kprobe, "kprobe:vfs_read");
        ap.func = "vfs_read".to_string();
        let expanded = expand(&ap, &oracle);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].func, "vfs_read");
    }

    #[test]
    fn partial_inline_clones_are_skipped() {
        let oracle = StaticSymbolOracle::new()
            .with_kernel_function("foo", 1)
            .with_kernel_function("foo.part.3", 2);
        let mut ap = AttachPoint::new(ProbeType::Kprobe, "kprobe:foo*");
        ap.func = "foo*".to_string();
        let expanded = expand(&ap, &oracle);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].func, "foo");
    }
}
