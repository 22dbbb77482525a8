//! Helper-call and runtime-error error-path tests: what the host-side
//! helper implementations and the async-action dispatcher do when a
//! compiled program's assumptions don't hold at runtime (a missing map, an
//! unrecognized func_id for a reported runtime error).

use tracec::codegen::visitor::AsyncActionId;
use tracec::codegen::FieldSchema;
use tracec::required_resources::{
    PrintfArgs, PrintfSeverity, RequiredResources, RuntimeErrorId, RuntimeErrorInfo, SourceInfo,
};
use tracec::runtime::handlers::{dispatch, HandlerOutcome};
use tracec::runtime::helpers;
use tracec::runtime::ring_buffer::{Frame, FrameHeader};

fn frame(action_id: u64, payload: Vec<u8>) -> Frame {
    Frame {
        header: FrameHeader { action_id, probe_id: 1, timestamp_ns: 0, cpu_id: 0, payload_len: payload.len() as u32 },
        payload,
    }
}

#[test]
fn test_map_lookup_elem_helper_on_missing_map_returns_zero_not_a_panic() {
    // map_id 0xffff was never created by maps::create; the helper should
    // report the miss through its return value rather than unwrap.
    let ret = helpers::bpf_map_lookup_elem(0xffff, 0, 0, 0, 0);
    assert_eq!(ret, 0);
}

#[test]
fn test_map_update_elem_helper_on_missing_map_returns_negative_one() {
    let ret = helpers::bpf_map_update_elem(0xffff, 0, 0, 0, 0);
    assert_eq!(ret, (-1i64) as u64);
}

#[test]
fn test_map_delete_elem_helper_on_missing_map_returns_negative_one() {
    let ret = helpers::bpf_map_delete_elem(0xffff, 0, 0, 0, 0);
    assert_eq!(ret, (-1i64) as u64);
}

#[test]
fn test_runtime_error_frame_with_known_func_id_is_handled() {
    let mut resources = RequiredResources::default();
    resources.runtime_error_info.insert(
        3,
        RuntimeErrorInfo { error_id: RuntimeErrorId::DivideByZero, func_id: 3, source: SourceInfo::default() },
    );
    let f = frame(AsyncActionId::RuntimeError as u64, vec![3]);
    assert_eq!(dispatch(&f, &resources, 0), HandlerOutcome::Handled);
}

#[test]
fn test_runtime_error_frame_with_unknown_func_id_is_handled_without_panicking() {
    let resources = RequiredResources::default();
    let f = frame(AsyncActionId::RuntimeError as u64, vec![200]);
    assert_eq!(dispatch(&f, &resources, 0), HandlerOutcome::Handled);
}

#[test]
fn test_helper_error_id_round_trips_through_json() {
    let mut resources = RequiredResources::default();
    resources.runtime_error_info.insert(
        1,
        RuntimeErrorInfo { error_id: RuntimeErrorId::HelperError, func_id: 1, source: SourceInfo::default() },
    );
    let json = resources.to_json().unwrap();
    let back = RequiredResources::from_json(&json).unwrap();
    assert_eq!(back.runtime_error_info[&1].error_id, RuntimeErrorId::HelperError);
}

#[test]
fn test_printf_with_truncated_payload_renders_without_panicking() {
    let mut resources = RequiredResources::default();
    resources.printf_args.push(PrintfArgs {
        format: "count=%d".into(),
        fields: vec![FieldSchema {
            name: "count".into(),
            offset: 0,
            size: 8,
            is_signed: true,
            is_string: false,
            bitfield: None,
        }],
        severity: PrintfSeverity::None,
        source: SourceInfo::default(),
    });
    // payload shorter than the declared field width; format_fields should
    // clamp rather than index out of bounds.
    let f = frame(AsyncActionId::Printf as u64, vec![1, 2]);
    assert_eq!(dispatch(&f, &resources, 0), HandlerOutcome::Handled);
}
