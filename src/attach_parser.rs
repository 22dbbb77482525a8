//! Attach-point string parser and per-provider arity rules.
//!
//! Grounded directly on `attachpoint_parser.cpp`: a colon-delimited lexer
//! that honors double-quoted parts (with `\x`-style escapes) and resolves
//! `$N` positional parameters before re-lexing the substituted text, feeding
//! a per-provider parser chosen by the first part.
//!
//! Function-name *wildcard* expansion against live symbols is
//! `probe_matcher`'s job; this module only turns the probe string into a
//! structurally valid `AttachPoint` (or rejects it).

use crate::ast::attach_point::{AttachPoint, ProbeType};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    EmptyProbe,
    UnknownProvider(String),
    UnterminatedQuote,
    InvalidEscape(char),
    BadPositionalParameter(String),
    WrongPartCount { provider: &'static str, got: usize, expected: &'static str },
    OffsetNotAllowed,
    InvalidOffset(String),
    InvalidAddress(String),
    LibraryNotFound(String),
    InvalidFrequency(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyProbe => write!(f, "empty probe specification"),
            Self::UnknownProvider(p) => write!(f, "unknown probe provider '{}'", p),
            Self::UnterminatedQuote => write!(f, "unterminated quoted string in probe"),
            Self::InvalidEscape(c) => write!(f, "invalid escape '\\{}' in probe", c),
            Self::BadPositionalParameter(s) => write!(f, "invalid positional parameter '{}'", s),
            Self::WrongPartCount { provider, got, expected } => write!(
                f,
                "{} probe expects {} colon-separated parts, got {}",
                provider, expected, got
            ),
            Self::OffsetNotAllowed => write!(f, "offset not allowed on return probes"),
            Self::InvalidOffset(s) => write!(f, "invalid offset '{}'", s),
            Self::InvalidAddress(s) => write!(f, "invalid address '{}'", s),
            Self::LibraryNotFound(s) => write!(f, "shared library '{}' not found", s),
            Self::InvalidFrequency(s) => write!(f, "invalid frequency '{}'", s),
        }
    }
}

impl std::error::Error for ParseError {}

/// Splits a raw probe string on `:`, honoring double-quoted parts (which may
/// themselves contain escaped colons/quotes via `\x`) and substituting `$N`
/// positional parameters before re-lexing the result, matching the
/// original's "substitute then relex" behavior so a parameter's text can
/// itself introduce new colon-delimited parts.
pub fn lex_attachpoint(raw: &str, params: &[String]) -> Result<Vec<String>, ParseError> {
    let substituted = substitute_positional_params(raw, params)?;
    split_respecting_quotes(&substituted)
}

fn substitute_positional_params(raw: &str, params: &[String]) -> Result<String, ParseError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut digits = String::new();
        while let Some(&(_, d)) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }

        if digits.is_empty() {
            // Not a positional parameter after all (e.g. a literal '$').
            out.push('$');
            continue;
        }

        let n: u64 = digits.parse().map_err(|_| ParseError::BadPositionalParameter(digits.clone()))?;
        if n == 0 {
            return Err(ParseError::BadPositionalParameter("$0".to_string()));
        }

        let idx = (n - 1) as usize;
        match params.get(idx) {
            Some(value) => out.push_str(value),
            None => out.push_str(""),
        }
    }

    Ok(out)
}

fn split_respecting_quotes(s: &str) -> Result<Vec<String>, ParseError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                let escaped = chars.next().ok_or(ParseError::UnterminatedQuote)?;
                current.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    '"' => '"',
                    '\\' => '\\',
                    ':' => ':',
                    other => return Err(ParseError::InvalidEscape(other)),
                });
            }
            ':' if !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            other => current.push(other),
        }
    }

    if in_quotes {
        return Err(ParseError::UnterminatedQuote);
    }

    parts.push(current);
    Ok(parts)
}

/// Parse one fully-lexed probe string into a structurally valid
/// `AttachPoint`, dispatching on the provider named by the first part.
pub fn parse_attachpoint(raw: &str, params: &[String]) -> Result<AttachPoint, ParseError> {
    let parts = lex_attachpoint(raw, params)?;
    if parts.is_empty() || parts[0].is_empty() {
        return Err(ParseError::EmptyProbe);
    }

    let provider = &parts[0];
    let probe_type = ProbeType::from_provider(provider)
        .ok_or_else(|| ParseError::UnknownProvider(provider.clone()))?;

    match probe_type {
        ProbeType::Begin | ProbeType::End | ProbeType::Self_ => special_parser(probe_type, raw, &parts),
        ProbeType::Bench => benchmark_parser(raw, &parts),
        ProbeType::Kprobe => kprobe_parser(raw, &parts, true),
        ProbeType::Kretprobe => kprobe_parser(raw, &parts, false),
        ProbeType::Uprobe | ProbeType::Uretprobe => {
            uprobe_parser(probe_type, raw, &parts, probe_type == ProbeType::Uprobe, true)
        }
        ProbeType::Usdt => usdt_parser(raw, &parts),
        ProbeType::Tracepoint => tracepoint_parser(raw, &parts),
        ProbeType::RawTracepoint => rawtracepoint_parser(raw, &parts),
        ProbeType::Profile | ProbeType::Interval => interval_parser(probe_type, raw, &parts),
        ProbeType::Watchpoint | ProbeType::AsyncWatchpoint => watchpoint_parser(probe_type, raw, &parts),
        ProbeType::Fentry | ProbeType::Fexit => fentry_parser(probe_type, raw, &parts),
        ProbeType::Iter => iter_parser(raw, &parts),
        ProbeType::Software | ProbeType::Hardware => software_hardware_parser(probe_type, raw, &parts),
        ProbeType::Special => unreachable!("ProbeType::Special is never returned by from_provider"),
    }
}

fn special_parser(pt: ProbeType, raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() != 1 {
        return Err(ParseError::WrongPartCount { provider: "BEGIN/END/self", got: parts.len(), expected: "1" });
    }
    Ok(AttachPoint::new(pt, raw))
}

fn benchmark_parser(raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() != 2 {
        return Err(ParseError::WrongPartCount { provider: "bench", got: parts.len(), expected: "2" });
    }
    let mut ap = AttachPoint::new(ProbeType::Bench, raw);
    ap.func = parts[1].clone();
    Ok(ap)
}

/// Splits a `func+offset` suffix. Returns `(func, Some(offset))` when a `+`
/// is present, `(func, None)` otherwise.
fn split_func_offset(s: &str) -> Result<(String, Option<i64>), ParseError> {
    match s.split_once('+') {
        None => Ok((s.to_string(), None)),
        Some((func, off)) => {
            let offset: i64 = off.parse().map_err(|_| ParseError::InvalidOffset(off.to_string()))?;
            Ok((func.to_string(), Some(offset)))
        }
    }
}

fn kprobe_parser(raw: &str, parts: &[String], allow_offset: bool) -> Result<AttachPoint, ParseError> {
    if parts.len() < 2 || parts.len() > 3 {
        return Err(ParseError::WrongPartCount {
            provider: "kprobe/kretprobe",
            got: parts.len(),
            expected: "2-3 (kprobe:func or kprobe:module:func)",
        });
    }

    let probe_type = if allow_offset { ProbeType::Kprobe } else { ProbeType::Kretprobe };
    let mut ap = AttachPoint::new(probe_type, raw);

    let func_part = if parts.len() == 3 {
        ap.target = parts[1].clone();
        &parts[2]
    } else {
        &parts[1]
    };

    let (func, offset) = split_func_offset(func_part)?;
    if offset.is_some() && !allow_offset {
        return Err(ParseError::OffsetNotAllowed);
    }
    ap.func = func;
    ap.func_offset = offset;
    Ok(ap)
}

fn uprobe_parser(
    pt: ProbeType,
    raw: &str,
    parts: &[String],
    allow_offset: bool,
    allow_abs_addr: bool,
) -> Result<AttachPoint, ParseError> {
    if parts.len() < 3 || parts.len() > 4 {
        return Err(ParseError::WrongPartCount {
            provider: "uprobe/uretprobe",
            got: parts.len(),
            expected: "3-4 (uprobe:target:func or uprobe:pid:target:func)",
        });
    }

    let mut ap = AttachPoint::new(pt, raw);
    let (target_part, func_part) = if parts.len() == 4 {
        ap.pid = Some(parts[1].parse().map_err(|_| ParseError::InvalidAddress(parts[1].clone()))?);
        (&parts[2], &parts[3])
    } else {
        (&parts[1], &parts[2])
    };
    ap.target = target_part.clone();

    if let Some(stripped) = func_part.strip_prefix("0x") {
        if !allow_abs_addr {
            return Err(ParseError::InvalidAddress(func_part.clone()));
        }
        ap.address = Some(u64::from_str_radix(stripped, 16).map_err(|_| ParseError::InvalidAddress(func_part.clone()))?);
        return Ok(ap);
    }

    let (func, offset) = split_func_offset(func_part)?;
    if offset.is_some() && !allow_offset {
        return Err(ParseError::OffsetNotAllowed);
    }
    ap.func = func;
    ap.func_offset = offset;
    Ok(ap)
}

fn usdt_parser(raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() < 3 || parts.len() > 4 {
        return Err(ParseError::WrongPartCount {
            provider: "usdt",
            got: parts.len(),
            expected: "3-4 (usdt:target:func or usdt:target:ns:func, PID-elided)",
        });
    }

    let mut ap = AttachPoint::new(ProbeType::Usdt, raw);
    ap.target = parts[1].clone();

    if parts.len() == 4 {
        ap.ns = parts[2].clone();
        ap.func = parts[3].clone();
    } else {
        ap.func = parts[2].clone();
    }
    Ok(ap)
}

fn tracepoint_parser(raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() != 3 {
        return Err(ParseError::WrongPartCount {
            provider: "tracepoint",
            got: parts.len(),
            expected: "3 (tracepoint:subsystem:event)",
        });
    }
    let mut ap = AttachPoint::new(ProbeType::Tracepoint, raw);
    ap.target = parts[1].clone();
    ap.func = parts[2].clone();
    Ok(ap)
}

fn rawtracepoint_parser(raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() != 2 {
        return Err(ParseError::WrongPartCount {
            provider: "rawtracepoint",
            got: parts.len(),
            expected: "2",
        });
    }
    let mut ap = AttachPoint::new(ProbeType::RawTracepoint, raw);
    ap.func = parts[1].clone();
    Ok(ap)
}

/// Minimum sampling period bpftrace itself enforces for a `kind:ns` interval,
/// to keep a misconfigured probe from pegging a CPU with overhead-only work.
const MIN_INTERVAL_NS: u64 = 1000;

/// `profile`/`interval` probes come in two shapes: `kind:unit:rate` (3
/// parts, e.g. `profile:hz:99`, `interval:s:1`) and the bare-nanosecond
/// `kind:ns` (2 parts, e.g. `interval:ns:500` is *not* this form — that's
/// 3 parts and hits the unit branch below with unit `"ns"`, which still
/// has to pass the same floor).
fn interval_parser(pt: ProbeType, raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() < 2 || parts.len() > 3 {
        return Err(ParseError::WrongPartCount {
            provider: "profile/interval",
            got: parts.len(),
            expected: "1 or 2 arguments (kind:unit:rate or kind:ns)",
        });
    }
    let mut ap = AttachPoint::new(pt, raw);

    let (num_str, unit) = if parts.len() == 3 {
        (parts[2].as_str(), parts[1].as_str())
    } else {
        let spec = parts[1].as_str();
        spec.char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| spec.split_at(i))
            .unwrap_or((spec, "hz"))
    };

    let num: u64 = num_str.parse().map_err(|_| ParseError::InvalidFrequency(raw.to_string()))?;

    if unit == "ns" {
        if num < MIN_INTERVAL_NS {
            return Err(ParseError::InvalidFrequency(format!(
                "{} is below the {} ns minimum interval",
                raw, MIN_INTERVAL_NS
            )));
        }
        // Frequencies are tracked in Hz; a nanosecond period converts to the
        // nearest Hz rate the sampling timer can be configured with.
        ap.freq = Some(1_000_000_000 / num.max(1));
    } else {
        ap.freq = Some(num);
    }
    Ok(ap)
}

fn watchpoint_parser(pt: ProbeType, raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() != 4 {
        return Err(ParseError::WrongPartCount {
            provider: "watchpoint/asyncwatchpoint",
            got: parts.len(),
            expected: "4 (w:addr_or_func:len:mode)",
        });
    }
    let mut ap = AttachPoint::new(pt, raw);
    if let Some(stripped) = parts[1].strip_prefix("0x") {
        ap.address = Some(u64::from_str_radix(stripped, 16).map_err(|_| ParseError::InvalidAddress(parts[1].clone()))?);
    } else {
        ap.func = parts[1].clone();
    }
    ap.len = Some(parts[2].parse().map_err(|_| ParseError::InvalidOffset(parts[2].clone()))?);
    ap.mode = Some(parts[3].clone());
    Ok(ap)
}

fn fentry_parser(pt: ProbeType, raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() < 2 || parts.len() > 3 {
        return Err(ParseError::WrongPartCount {
            provider: "fentry/fexit",
            got: parts.len(),
            expected: "2-3 (fentry:func or fentry:target:func)",
        });
    }
    let mut ap = AttachPoint::new(pt, raw);
    if parts.len() == 3 {
        ap.target = parts[1].clone();
        ap.func = parts[2].clone();
    } else {
        ap.func = parts[1].clone();
    }
    Ok(ap)
}

fn iter_parser(raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() != 2 {
        return Err(ParseError::WrongPartCount { provider: "iter", got: parts.len(), expected: "2" });
    }
    let mut ap = AttachPoint::new(ProbeType::Iter, raw);
    ap.func = parts[1].clone();
    Ok(ap)
}

fn software_hardware_parser(pt: ProbeType, raw: &str, parts: &[String]) -> Result<AttachPoint, ParseError> {
    if parts.len() < 2 || parts.len() > 3 {
        return Err(ParseError::WrongPartCount {
            provider: "software/hardware",
            got: parts.len(),
            expected: "2-3 (kind:event or kind:event:count)",
        });
    }
    let mut ap = AttachPoint::new(pt, raw);
    ap.func = parts[1].clone();
    if parts.len() == 3 {
        ap.freq = Some(parts[2].parse().map_err(|_| ParseError::InvalidFrequency(parts[2].clone()))?);
    }
    Ok(ap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_plain_colons() {
        let parts = lex_attachpoint("kprobe:vfs_read", &[]).unwrap();
        assert_eq!(parts, vec!["kprobe", "vfs_read"]);
    }

    #[test]
    fn positional_parameter_substitutes_and_relexes() {
        let params = vec!["a:b".to_string()];
        let parts = lex_attachpoint("kprobe:$1", &params).unwrap();
        assert_eq!(parts, vec!["kprobe", "a", "b"]);
    }

    #[test]
    fn dollar_zero_is_rejected() {
        let err = lex_attachpoint("kprobe:$0", &[]).unwrap_err();
        assert!(matches!(err, ParseError::BadPositionalParameter(_)));
    }

    #[test]
    fn kprobe_with_offset() {
        let ap = parse_attachpoint("kprobe:vfs_read+16", &[]).unwrap();
        assert_eq!(ap.func, "vfs_read");
        assert_eq!(ap.func_offset, Some(16));
    }

    #[test]
    fn kretprobe_rejects_offset() {
        let err = parse_attachpoint("kretprobe:vfs_read+16", &[]).unwrap_err();
        assert_eq!(err, ParseError::OffsetNotAllowed);
    }

    #[test]
    fn uprobe_pid_elided_with_target_and_func() {
        let ap = parse_attachpoint("uprobe:/bin/bash:readline", &[]).unwrap();
        assert_eq!(ap.target, "/bin/bash");
        assert_eq!(ap.func, "readline");
        assert!(ap.pid.is_none());
    }

    #[test]
    fn uprobe_with_pid() {
        let ap = parse_attachpoint("uprobe:1234:/bin/bash:readline", &[]).unwrap();
        assert_eq!(ap.pid, Some(1234));
        assert_eq!(ap.target, "/bin/bash");
    }

    #[test]
    fn usdt_three_or_four_parts() {
        let a = parse_attachpoint("usdt:/bin/app:probe1", &[]).unwrap();
        assert_eq!(a.func, "probe1");
        let b = parse_attachpoint("usdt:/bin/app:myns:probe1", &[]).unwrap();
        assert_eq!(b.ns, "myns");
        assert_eq!(b.func, "probe1");
    }

    #[test]
    fn quoted_part_with_escaped_colon() {
        let parts = split_respecting_quotes(r#"printf:"a\:b""#).unwrap();
        assert_eq!(parts, vec!["printf", "a:b"]);
    }

    #[test]
    fn watchpoint_parses_address_len_mode() {
        let ap = parse_attachpoint("watchpoint:0x10000000:8:rw", &[]).unwrap();
        assert_eq!(ap.address, Some(0x1000_0000));
        assert_eq!(ap.len, Some(8));
        assert_eq!(ap.mode.as_deref(), Some("rw"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = parse_attachpoint("notaprovider:foo", &[]).unwrap_err();
        assert!(matches!(err, ParseError::UnknownProvider(_)));
    }

    #[test]
    fn interval_kind_unit_rate_form() {
        let ap = parse_attachpoint("interval:s:1", &[]).unwrap();
        assert_eq!(ap.freq, Some(1));
        let ap = parse_attachpoint("profile:hz:99", &[]).unwrap();
        assert_eq!(ap.freq, Some(99));
    }

    #[test]
    fn interval_single_arg_ns_form_converts_to_hz() {
        let ap = parse_attachpoint("interval:2000ns", &[]).unwrap();
        assert_eq!(ap.freq, Some(500_000));
    }

    #[test]
    fn interval_ns_below_floor_is_a_fatal_error() {
        let err = parse_attachpoint("interval:ns:500", &[]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFrequency(_)));
    }

    #[test]
    fn interval_wrong_part_count_mentions_one_or_two_arguments() {
        let err = parse_attachpoint("interval:a:b:c", &[]).unwrap_err();
        match err {
            ParseError::WrongPartCount { expected, .. } => assert!(expected.contains("1 or 2 arguments")),
            other => panic!("expected WrongPartCount, got {:?}", other),
        }
    }

    #[test]
    fn software_hardware_accepts_optional_count() {
        let ap = parse_attachpoint("software:cpu-clock:1000", &[]).unwrap();
        assert_eq!(ap.func, "cpu-clock");
        assert_eq!(ap.freq, Some(1000));
        let ap = parse_attachpoint("hardware:cache-misses", &[]).unwrap();
        assert_eq!(ap.func, "cache-misses");
        assert_eq!(ap.freq, None);
    }
}
