//! Integration tests for attach-point parsing and wildcard expansion.

use tracec::ast::attach_point::ProbeType;
use tracec::attach_parser::{parse_attachpoint, ParseError};
use tracec::probe_matcher;
use tracec::symbol_oracle::StaticSymbolOracle;

#[test]
fn test_parses_plain_kprobe() {
    let ap = parse_attachpoint("kprobe:vfs_read", &[]).unwrap();
    assert_eq!(ap.probe_type, ProbeType::Kprobe);
    assert_eq!(ap.func, "vfs_read");
}

#[test]
fn test_parses_kprobe_with_offset() {
    let ap = parse_attachpoint("kprobe:vfs_read+16", &[]).unwrap();
    assert_eq!(ap.func, "vfs_read");
    assert_eq!(ap.func_offset, Some(16));
}

#[test]
fn test_kretprobe_rejects_offset() {
    let err = parse_attachpoint("kretprobe:vfs_read+16", &[]).unwrap_err();
    assert_eq!(err, ParseError::OffsetNotAllowed);
}

#[test]
fn test_unknown_provider_is_rejected() {
    let err = parse_attachpoint("nonsense:foo", &[]).unwrap_err();
    assert!(matches!(err, ParseError::UnknownProvider(_)));
}

#[test]
fn test_empty_probe_string_is_rejected() {
    let err = parse_attachpoint("", &[]).unwrap_err();
    assert_eq!(err, ParseError::EmptyProbe);
}

#[test]
fn test_positional_parameter_is_substituted_before_lexing() {
    let ap = parse_attachpoint("kprobe:$1", &["vfs_write".to_string()]).unwrap();
    assert_eq!(ap.func, "vfs_write");
}

#[test]
fn test_wildcard_expansion_matches_every_candidate() {
    let ap = parse_attachpoint("kprobe:vfs_*", &[]).unwrap();
    let oracle = StaticSymbolOracle::new()
        .with_kernel_function("vfs_read", 1)
        .with_kernel_function("vfs_write", 2)
        .with_kernel_function("do_sys_open", 3);

    let mut expanded: Vec<String> = probe_matcher::expand(&ap, &oracle).into_iter().map(|a| a.func).collect();
    expanded.sort();
    assert_eq!(expanded, vec!["vfs_read".to_string(), "vfs_write".to_string()]);
}

#[test]
fn test_wildcard_expansion_skips_partial_inline_clones() {
    let ap = parse_attachpoint("kprobe:vfs_*", &[]).unwrap();
    let oracle = StaticSymbolOracle::new()
        .with_kernel_function("vfs_read", 1)
        .with_kernel_function("vfs_read.part.0", 2);

    let expanded = probe_matcher::expand(&ap, &oracle);
    assert_eq!(expanded.len(), 1);
    assert_eq!(expanded[0].func, "vfs_read");
}

#[test]
fn test_non_wildcard_attach_point_passes_through_unchanged() {
    let ap = parse_attachpoint("kprobe:vfs_read", &[]).unwrap();
    let oracle = StaticSymbolOracle::new();
    let expanded = probe_matcher::expand(&ap, &oracle);
    assert_eq!(expanded.len(), 1);
    assert_eq!(expanded[0].func, "vfs_read");
}

#[test]
fn test_wildcard_expansion_with_no_matches_returns_empty() {
    let ap = parse_attachpoint("kprobe:nosuchfunc_*", &[]).unwrap();
    let oracle = StaticSymbolOracle::new().with_kernel_function("vfs_read", 1);
    let expanded = probe_matcher::expand(&ap, &oracle);
    assert!(expanded.is_empty());
}
