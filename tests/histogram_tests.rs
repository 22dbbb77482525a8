//! Integration tests for the `hist()`/`lhist()` histogram backing stores.

use tracec::codegen::inline_helpers::log2;
use tracec::runtime::histogram::{LatencyHistogram, LinearHistogram, PowerOfTwoHistogram};

#[test]
fn test_power_of_two_histogram_groups_samples_by_log2_bucket() {
    let h = PowerOfTwoHistogram::new();
    for v in [1, 2, 3, 225, 225, 225] {
        h.record(v);
    }
    assert_eq!(h.total(), 6);
    let snap = h.snapshot();
    let bucket_225 = log2(225, 0);
    let count_225 = snap.iter().find(|(b, _)| *b == bucket_225).map(|(_, c)| *c);
    assert_eq!(count_225, Some(3));
}

#[test]
fn test_power_of_two_histogram_negative_values_land_in_zero_bucket() {
    let h = PowerOfTwoHistogram::new();
    h.record(-10);
    h.record(-1);
    let snap = h.snapshot();
    assert_eq!(snap, vec![(0, 2)]);
}

#[test]
fn test_linear_histogram_groups_by_fixed_step() {
    let h = LinearHistogram::new(0, 1000, 100);
    h.record(0);
    h.record(50);
    h.record(99);
    h.record(500);
    let snap = h.snapshot();
    let bucket_0 = snap.iter().find(|(b, _)| *b == 0).map(|(_, c)| *c);
    let bucket_500 = snap.iter().find(|(b, _)| *b == 500).map(|(_, c)| *c);
    assert_eq!(bucket_0, Some(3));
    assert_eq!(bucket_500, Some(1));
}

#[test]
fn test_linear_histogram_clamps_step_to_at_least_one() {
    // step=0 would divide by zero; LinearHistogram::new coerces it to 1.
    let h = LinearHistogram::new(0, 10, 0);
    h.record(5);
    assert_eq!(h.snapshot().len(), 1);
}

#[test]
fn test_latency_histogram_computes_approximate_percentiles() {
    let h = LatencyHistogram::new();
    for _ in 0..100 {
        h.record(500); // 0-1us bucket
    }
    let snap = h.snapshot();
    assert_eq!(snap.total, 100);
    assert_eq!(snap.p50_ns, 1_000);
    assert_eq!(snap.p99_ns, 1_000);
}

#[test]
fn test_latency_histogram_reset_clears_all_buckets() {
    let h = LatencyHistogram::new();
    h.record(5_000_000);
    h.reset();
    assert_eq!(h.snapshot().total, 0);
}
