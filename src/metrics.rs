//! Running per-label statistics backed by HDR histograms.
//!
//! `StatCalculator` is the single-owner accumulator used by report consumers;
//! `MetricAccumulator` wraps one behind a mutex so that many worker threads
//! can feed the same label during a live run.
//!
//! ## Precision
//!
//! Values are elapsed times in milliseconds recorded into a histogram that
//! tracks `0..=3_600_000` ms with 2 significant digits. Values up to 255 ms
//! are recorded exactly; above that each bucket spans at most 1% of its
//! value. Percentile queries return the highest value equivalent to the
//! bucket holding the requested rank (no interpolation inside a bucket), and
//! `mean`/`std_dev` are computed from bucket midpoints, so they agree with
//! `sum / count` within that same 1% bound.
//!
//! Values outside the trackable range are clamped to the nearest bound and
//! recorded anyway.

use crate::sample::Sample;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lowest value distinguishable from zero, in milliseconds.
pub const LOWEST_DISCERNIBLE_MS: u64 = 1;

/// Highest trackable value (one hour), in milliseconds.
pub const HIGHEST_TRACKABLE_MS: u64 = 3_600_000;

/// Significant decimal digits kept by the histogram.
pub const SIGNIFICANT_DIGITS: u8 = 2;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(LOWEST_DISCERNIBLE_MS, HIGHEST_TRACKABLE_MS, SIGNIFICANT_DIGITS)
        .expect("constant histogram bounds are valid")
}

fn clamp_value(value: i64) -> i64 {
    value.clamp(0, HIGHEST_TRACKABLE_MS as i64)
}

/// Percentile value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: i64,
}

/// Exported statistics for one label (or the aggregate row).
///
/// Rates are per second; `error_rate` is a percentage. Every field is
/// defined for an empty calculator (zeros), so zero-sample reports never
/// produce NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSummary {
    pub count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub throughput: f64,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub median: i64,
    #[serde(rename = "stddev")]
    pub std_dev: f64,
    pub percentiles: Vec<PercentileValue>,
    pub bytes_per_second: f64,
    pub sent_bytes_per_second: f64,
}

/// Single-owner running statistics for one label.
#[derive(Debug, Clone)]
pub struct StatCalculator {
    histogram: Histogram<u64>,
    count: u64,
    error_count: u64,
    sum: u64,
    min: i64,
    max: i64,
    bytes_received: u64,
    bytes_sent: u64,
    first_start: i64,
    last_end: i64,
}

impl Default for StatCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatCalculator {
    pub fn new() -> Self {
        Self {
            histogram: new_histogram(),
            count: 0,
            error_count: 0,
            sum: 0,
            min: i64::MAX,
            max: i64::MIN,
            bytes_received: 0,
            bytes_sent: 0,
            first_start: i64::MAX,
            last_end: i64::MIN,
        }
    }

    /// Record one occurrence of `value`.
    pub fn add_value(&mut self, value: i64) {
        self.add_value_n(value, 1);
    }

    /// Record `multiplicity` occurrences of `value` in one step.
    pub fn add_value_n(&mut self, value: i64, multiplicity: u64) {
        if multiplicity == 0 {
            return;
        }
        let value = clamp_value(value);
        self.histogram.saturating_record_n(value as u64, multiplicity);
        self.count = self.count.saturating_add(multiplicity);
        self.sum = self.sum.saturating_add((value as u64).saturating_mul(multiplicity));
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Record a complete sample: elapsed time, outcome, byte counters and
    /// wall-clock bounds.
    pub fn add_sample(&mut self, sample: &Sample) {
        self.add_value(sample.elapsed());
        if !sample.success() {
            self.error_count = self.error_count.saturating_add(1);
        }
        self.add_bytes(sample.bytes_received());
        self.add_sent_bytes(sample.bytes_sent());
        self.first_start = self.first_start.min(sample.start_time());
        self.last_end = self.last_end.max(sample.end_time());
    }

    pub fn add_bytes(&mut self, bytes: i64) {
        self.bytes_received = self.bytes_received.saturating_add(bytes.max(0) as u64);
    }

    pub fn add_sent_bytes(&mut self, bytes: i64) {
        self.bytes_sent = self.bytes_sent.saturating_add(bytes.max(0) as u64);
    }

    /// Fold another calculator into this one.
    ///
    /// The histogram merge is a bucket-wise union, so repeated merges never
    /// compound error and the result does not depend on merge order.
    pub fn merge(&mut self, other: &StatCalculator) {
        if let Err(e) = self.histogram.add(&other.histogram) {
            // Both sides share the same bounds, so this only fires if that
            // ever changes.
            warn!("Histogram merge failed, recording bucket by bucket: {}", e);
            for v in other.histogram.iter_recorded() {
                self.histogram
                    .saturating_record_n(v.value_iterated_to(), v.count_at_value());
            }
        }
        self.count = self.count.saturating_add(other.count);
        self.error_count = self.error_count.saturating_add(other.error_count);
        self.sum = self.sum.saturating_add(other.sum);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.bytes_received = self.bytes_received.saturating_add(other.bytes_received);
        self.bytes_sent = self.bytes_sent.saturating_add(other.bytes_sent);
        self.first_start = self.first_start.min(other.first_start);
        self.last_end = self.last_end.max(other.last_end);
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn sum(&self) -> u64 {
        self.sum
    }

    pub fn min(&self) -> Option<i64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<i64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_received
    }

    pub fn total_sent_bytes(&self) -> u64 {
        self.bytes_sent
    }

    /// Total weight held by the histogram; always equal to `count()`.
    pub fn histogram_len(&self) -> u64 {
        self.histogram.len()
    }

    /// Value below which `percent`% of recorded observations fall
    /// (`percent` in `[0, 100]`, clamped). Zero when empty.
    pub fn percentile(&self, percent: f64) -> i64 {
        if self.count == 0 {
            return 0;
        }
        let percent = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        self.histogram.value_at_percentile(percent) as i64
    }

    pub fn median(&self) -> i64 {
        self.percentile(50.0)
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.histogram.mean()
    }

    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.histogram.stdev()
    }

    /// Error percentage in `[0, 100]`.
    pub fn error_percentage(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.count as f64 * 100.0
    }

    /// Wall-clock span covered by the recorded samples, in milliseconds.
    pub fn elapsed_wall_ms(&self) -> i64 {
        if self.last_end < self.first_start {
            return 0;
        }
        self.last_end - self.first_start
    }

    /// Samples per second over the wall-clock span.
    pub fn throughput(&self) -> f64 {
        self.per_second(self.count as f64)
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.per_second(self.bytes_received as f64)
    }

    pub fn sent_bytes_per_second(&self) -> f64 {
        self.per_second(self.bytes_sent as f64)
    }

    fn per_second(&self, amount: f64) -> f64 {
        let elapsed_ms = self.elapsed_wall_ms();
        if elapsed_ms <= 0 {
            return 0.0;
        }
        amount / (elapsed_ms as f64 / 1000.0)
    }

    pub fn summary(&self, percentiles: &[f64]) -> StatSummary {
        StatSummary {
            count: self.count,
            error_count: self.error_count,
            error_rate: self.error_percentage(),
            throughput: self.throughput(),
            min: self.min().unwrap_or(0),
            max: self.max().unwrap_or(0),
            mean: self.mean(),
            median: self.median(),
            std_dev: self.std_dev(),
            percentiles: percentiles
                .iter()
                .map(|&p| PercentileValue {
                    percentile: p,
                    value: self.percentile(p),
                })
                .collect(),
            bytes_per_second: self.bytes_per_second(),
            sent_bytes_per_second: self.sent_bytes_per_second(),
        }
    }
}

/// Thread-safe accumulator for one label.
///
/// `add_*` calls may come from any number of threads. `merge` should only
/// be used on accumulators whose writers have finished.
#[derive(Debug)]
pub struct MetricAccumulator {
    label: String,
    inner: Mutex<StatCalculator>,
}

impl MetricAccumulator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inner: Mutex::new(StatCalculator::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn add_value(&self, value: i64) {
        self.inner.lock().add_value(value);
    }

    pub fn add_value_n(&self, value: i64, multiplicity: u64) {
        self.inner.lock().add_value_n(value, multiplicity);
    }

    pub fn add_sample(&self, sample: &Sample) {
        self.inner.lock().add_sample(sample);
    }

    /// Fold `other` into this accumulator.
    pub fn merge(&self, other: &MetricAccumulator) {
        if std::ptr::eq(self, other) {
            let copy = self.snapshot();
            self.inner.lock().merge(&copy);
            return;
        }
        let theirs = other.snapshot();
        self.inner.lock().merge(&theirs);
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> StatCalculator {
        self.inner.lock().clone()
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().count()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(values: &[i64]) -> StatCalculator {
        let mut calc = StatCalculator::new();
        for &v in values {
            calc.add_value(v);
        }
        calc
    }

    #[test]
    fn test_percentile_after_merge() {
        let mut calc = calculator(&[10, 9, 5, 6, 3, 8, 2, 7, 4]);
        let other = calculator(&[11, 23, 2]);
        calc.merge(&other);

        assert_eq!(calc.max(), Some(23));
        assert_eq!(calc.min(), Some(2));
        assert_eq!(calc.count(), 12);
        assert_eq!(calc.percentile(89.999_99), 11);
    }

    #[test]
    fn test_median_even_count() {
        let calc = calculator(&[10, 20, 30, 40, 50, 60, 80, 90]);
        assert_eq!(calc.median(), 40);
        assert_eq!(calc.percentile(90.0), 90);
    }

    #[test]
    fn test_multiplicity_matches_repeated_adds() {
        let mut batched = StatCalculator::new();
        batched.add_value_n(5, 3);
        batched.add_value(1);
        batched.add_value(7);

        let single = calculator(&[5, 5, 5, 1, 7]);

        assert_eq!(batched.count(), 5);
        assert_eq!(batched.min(), Some(1));
        assert_eq!(batched.max(), Some(7));
        assert_eq!(batched.median(), single.median());
        assert_eq!(batched.mean(), single.mean());
        assert_eq!(batched.std_dev(), single.std_dev());
        assert_eq!(batched.histogram_len(), batched.count());
    }

    #[test]
    fn test_zero_multiplicity_is_noop() {
        let mut calc = StatCalculator::new();
        calc.add_value_n(42, 0);
        assert!(calc.is_empty());
        assert_eq!(calc.min(), None);
    }

    #[test]
    fn test_huge_multiplicity_saturates() {
        let mut calc = StatCalculator::new();
        calc.add_value_n(5, u64::MAX);
        calc.add_value_n(5, 10);
        assert_eq!(calc.count(), u64::MAX);

        let mut merged = calculator(&[1, 2]);
        merged.merge(&calc);
        assert_eq!(merged.count(), u64::MAX);
        assert_eq!(merged.min(), Some(1));
    }

    #[test]
    fn test_summary_serializes_stddev_key() {
        let summary = calculator(&[1, 2, 3]).summary(&[50.0]);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("stddev").is_some());
        assert!(json.get("stdDev").is_none());
        assert_eq!(json["errorRate"], serde_json::json!(0.0));
    }

    #[test]
    fn test_standard_deviation() {
        let calc = calculator(&[1, 2, 3, 2, 2, 2]);
        assert_eq!(calc.count(), 6);
        assert_eq!(calc.sum(), 12);
        assert!((calc.std_dev() - 0.577_350_269_189_625_8).abs() < 1e-9);
        assert!((calc.mean() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_standard_deviation_after_merge() {
        let mut calc = calculator(&[1, 2, 3]);
        calc.merge(&calculator(&[2, 2, 2]));
        assert_eq!(calc.count(), 6);
        assert_eq!(calc.sum(), 12);
        assert!((calc.std_dev() - 0.577_350_269_189_625_8).abs() < 1e-9);
    }

    #[test]
    fn test_mean_tracks_sum_within_precision() {
        let calc = calculator(&[100, 200, 300, 1_234, 45_000]);
        let exact = calc.sum() as f64 / calc.count() as f64;
        assert!((calc.mean() - exact).abs() / exact < 0.01);
    }

    #[test]
    fn test_clear() {
        let mut calc = calculator(&[1, 2, 3]);
        calc.add_bytes(10);
        assert_eq!(calc.count(), 3);
        calc.clear();
        assert_eq!(calc.count(), 0);
        assert_eq!(calc.sum(), 0);
        assert_eq!(calc.total_bytes(), 0);
        assert_eq!(calc.histogram_len(), 0);
    }

    #[test]
    fn test_bytes() {
        let mut calc = StatCalculator::new();
        calc.add_bytes(300);
        calc.add_bytes(200);
        calc.add_bytes(100);
        assert_eq!(calc.total_bytes(), 600);
        calc.add_sent_bytes(300);
        calc.add_sent_bytes(200);
        calc.add_sent_bytes(100);
        assert_eq!(calc.total_sent_bytes(), 600);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let calc = calculator(&[-5, 7_200_000]);
        assert_eq!(calc.count(), 2);
        assert_eq!(calc.min(), Some(0));
        assert_eq!(calc.max(), Some(HIGHEST_TRACKABLE_MS as i64));
        assert_eq!(calc.histogram_len(), 2);
        assert!(calc.percentile(100.0) >= HIGHEST_TRACKABLE_MS as i64);
    }

    #[test]
    fn test_empty_summary_has_no_nan() {
        let summary = StatCalculator::new().summary(&[50.0, 99.0]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.error_rate, 0.0);
        assert_eq!(summary.throughput, 0.0);
        assert_eq!(summary.mean, 0.0);
        assert_eq!(summary.std_dev, 0.0);
        assert_eq!(summary.percentiles[1].value, 0);
        assert!(!summary.bytes_per_second.is_nan());
    }

    #[test]
    fn test_sample_rates() {
        let mut calc = StatCalculator::new();
        calc.add_sample(&Sample::new("a", 0, 100, true).with_bytes(1_000, 10));
        calc.add_sample(&Sample::new("a", 1_000, 1_000, false).with_bytes(1_000, 10));

        assert_eq!(calc.elapsed_wall_ms(), 2_000);
        assert_eq!(calc.error_count(), 1);
        assert!((calc.throughput() - 1.0).abs() < 1e-9);
        assert!((calc.bytes_per_second() - 1_000.0).abs() < 1e-9);
        assert!((calc.sent_bytes_per_second() - 10.0).abs() < 1e-9);
        assert!((calc.error_percentage() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_accumulator_concurrent_adds() {
        let acc = MetricAccumulator::new("shared");
        std::thread::scope(|s| {
            for t in 0..4 {
                let acc = &acc;
                s.spawn(move || {
                    for i in 0..1_000 {
                        acc.add_value(t * 1_000 + i);
                    }
                });
            }
        });
        let snapshot = acc.snapshot();
        assert_eq!(snapshot.count(), 4_000);
        assert_eq!(snapshot.min(), Some(0));
        assert_eq!(snapshot.max(), Some(3_999));
        assert_eq!(snapshot.histogram_len(), 4_000);
    }

    #[test]
    fn test_accumulator_self_merge() {
        let acc = MetricAccumulator::new("self");
        acc.add_value(4);
        acc.merge(&acc);
        assert_eq!(acc.count(), 2);
    }
}
