//! Histogram storage backing the `hist()`/`lhist()` map aggregations, plus
//! a fixed-bucket latency histogram for dispatcher/probe timing stats.
//!
//! `PowerOfTwoHistogram` buckets samples with `codegen::inline_helpers::
//! log2`, the same routine the compiled BPF side uses to compute a
//! bucket index before doing the map update — so a host-side readback of
//! a `hist()` map and the in-BPF bucket assignment always agree.
//! `LatencyHistogram` is unrelated to script-level `hist()`: it's the
//! teacher's fixed-nanosecond-bucket histogram, kept for the dispatcher's
//! own operational timing stats (grounded on the teacher's
//! `tracepoints/histogram.rs`).

use crate::codegen::inline_helpers::log2;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// `k` extra linear sub-buckets per power-of-two step, matching the `hist()`
/// builtin's default resolution.
const DEFAULT_K: u32 = 0;

/// Power-of-two bucketed histogram backing a `hist()`-aggregated map
/// value. Buckets are allocated lazily as samples arrive rather than
/// pre-sized, since the range of a script's samples isn't known ahead of
/// time.
#[derive(Debug, Default)]
pub struct PowerOfTwoHistogram {
    buckets: Mutex<BTreeMap<i64, u64>>,
}

impl PowerOfTwoHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, value: i64) {
        let bucket = log2(value, DEFAULT_K);
        *self.buckets.lock().unwrap().entry(bucket).or_insert(0) += 1;
    }

    /// `(bucket_index, count)` pairs in ascending bucket order, as printed
    /// by `print_map` for a `hist()`-declared map.
    pub fn snapshot(&self) -> Vec<(i64, u64)> {
        self.buckets.lock().unwrap().iter().map(|(&k, &v)| (k, v)).collect()
    }

    pub fn total(&self) -> u64 {
        self.buckets.lock().unwrap().values().sum()
    }

    pub fn clear(&self) {
        self.buckets.lock().unwrap().clear();
    }
}

/// Linear histogram backing `lhist(value, min, max, step)`: buckets below
/// `min` and above `max` collapse into underflow/overflow slots.
#[derive(Debug)]
pub struct LinearHistogram {
    min: i64,
    max: i64,
    step: i64,
    buckets: Mutex<BTreeMap<i64, u64>>,
}

impl LinearHistogram {
    pub fn new(min: i64, max: i64, step: i64) -> Self {
        Self { min, max, step: step.max(1), buckets: Mutex::new(BTreeMap::new()) }
    }

    fn bucket_index(&self, value: i64) -> i64 {
        if value < self.min {
            i64::MIN
        } else if value > self.max {
            i64::MAX
        } else {
            self.min + ((value - self.min) / self.step) * self.step
        }
    }

    pub fn record(&self, value: i64) {
        let bucket = self.bucket_index(value);
        *self.buckets.lock().unwrap().entry(bucket).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> Vec<(i64, u64)> {
        self.buckets.lock().unwrap().iter().map(|(&k, &v)| (k, v)).collect()
    }
}

/// Bucket boundaries in nanoseconds (logarithmic distribution).
pub const BUCKET_BOUNDS_NS: [u64; 8] = [
    1_000,         // 0: 0-1us
    10_000,        // 1: 1-10us
    100_000,       // 2: 10-100us
    1_000_000,     // 3: 100us-1ms
    10_000_000,    // 4: 1-10ms
    100_000_000,   // 5: 10-100ms
    1_000_000_000, // 6: 100ms-1s
    u64::MAX,      // 7: >1s
];

/// Bucket labels for display.
pub const BUCKET_LABELS: [&str; 8] = [
    "     0-1us",
    "    1-10us",
    "  10-100us",
    "100us-1ms ",
    "   1-10ms ",
    " 10-100ms ",
    "100ms-1s  ",
    "      >1s ",
];

/// Latency histogram with 8 logarithmic buckets.
#[derive(Debug)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; 8],
}

impl LatencyHistogram {
    /// Create a new empty histogram.
    pub const fn new() -> Self {
        Self {
            buckets: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    /// Record a latency sample.
    pub fn record(&self, duration_ns: u64) {
        let idx = self.find_bucket(duration_ns);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Find the bucket index for a given duration.
    fn find_bucket(&self, duration_ns: u64) -> usize {
        for (i, &bound) in BUCKET_BOUNDS_NS.iter().enumerate() {
            if duration_ns < bound {
                return i;
            }
        }
        7
    }

    /// Get a snapshot of the histogram.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut buckets = [0u64; 8];
        let mut total = 0u64;

        for (i, bucket) in self.buckets.iter().enumerate() {
            buckets[i] = bucket.load(Ordering::Relaxed);
            total += buckets[i];
        }

        let p50 = Self::percentile_from_buckets(&buckets, total, 0.50);
        let p90 = Self::percentile_from_buckets(&buckets, total, 0.90);
        let p99 = Self::percentile_from_buckets(&buckets, total, 0.99);

        HistogramSnapshot {
            buckets,
            total,
            p50_ns: p50,
            p90_ns: p90,
            p99_ns: p99,
        }
    }

    /// Calculate approximate percentile from bucket distribution.
    fn percentile_from_buckets(buckets: &[u64; 8], total: u64, p: f64) -> u64 {
        if total == 0 {
            return 0;
        }
        let target = (total as f64 * p) as u64;
        let mut cumulative = 0u64;
        for (i, &count) in buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return BUCKET_BOUNDS_NS[i];
            }
        }
        BUCKET_BOUNDS_NS[7]
    }

    /// Reset all buckets to zero.
    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of histogram data.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    /// Count in each bucket.
    pub buckets: [u64; 8],
    /// Total sample count.
    pub total: u64,
    /// Approximate 50th percentile in nanoseconds.
    pub p50_ns: u64,
    /// Approximate 90th percentile in nanoseconds.
    pub p90_ns: u64,
    /// Approximate 99th percentile in nanoseconds.
    pub p99_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_histogram_matches_inline_log2() {
        let h = PowerOfTwoHistogram::new();
        h.record(225);
        h.record(225);
        h.record(3);
        let snap = h.snapshot();
        assert_eq!(h.total(), 3);
        let bucket_225 = log2(225, DEFAULT_K);
        assert!(snap.contains(&(bucket_225, 2)));
    }

    #[test]
    fn power_of_two_histogram_clears() {
        let h = PowerOfTwoHistogram::new();
        h.record(42);
        h.clear();
        assert_eq!(h.total(), 0);
        assert!(h.snapshot().is_empty());
    }

    #[test]
    fn linear_histogram_buckets_in_range_values_by_step() {
        let h = LinearHistogram::new(0, 100, 10);
        h.record(23);
        h.record(27);
        h.record(99);
        let snap = h.snapshot();
        assert!(snap.contains(&(20, 2)));
        assert!(snap.contains(&(90, 1)));
    }

    #[test]
    fn linear_histogram_collapses_out_of_range_into_under_overflow() {
        let h = LinearHistogram::new(0, 100, 10);
        h.record(-5);
        h.record(1000);
        let snap = h.snapshot();
        assert!(snap.contains(&(i64::MIN, 1)));
        assert!(snap.contains(&(i64::MAX, 1)));
    }

    #[test]
    fn latency_histogram_buckets_by_nanosecond_bound() {
        let h = LatencyHistogram::new();
        h.record(500);
        h.record(5_000);
        h.record(2_000_000_000);
        let snap = h.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.buckets[0], 1);
        assert_eq!(snap.buckets[1], 1);
        assert_eq!(snap.buckets[7], 1);
    }
}
