//! Summary consumers: per-label tables plus an overall ("Total") row.
//!
//! Every summary exports the same envelope:
//!
//! ```json
//! { "overall": { "label": "Total", ... }, "items": { "<label>": { ... } } }
//! ```
//!
//! Exports requested before `finish` return `None`.

use super::consumer::{Emitter, SampleConsumer};
use crate::metrics::{StatCalculator, StatSummary};
use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

pub const OVERALL_LABEL: &str = "Total";

#[derive(Debug, Serialize)]
struct Row<'a, T: Serialize> {
    label: &'a str,
    #[serde(flatten)]
    data: T,
}

#[derive(Debug, Serialize)]
struct SummaryExport<'a, T: Serialize> {
    overall: Row<'a, T>,
    items: BTreeMap<&'a str, T>,
}

/// Per-label state plus an overall accumulator.
#[derive(Debug, Default)]
struct SummaryTable<T> {
    items: BTreeMap<String, T>,
    overall: T,
    finished: bool,
}

impl<T: Default> SummaryTable<T> {
    fn reset(&mut self) {
        self.items.clear();
        self.overall = T::default();
        self.finished = false;
    }

    /// Apply `update` to the row for `label`, creating it on first use.
    fn update_item(&mut self, label: &str, update: impl FnOnce(&mut T)) {
        match self.items.get_mut(label) {
            Some(item) => update(item),
            None => update(self.items.entry(label.to_string()).or_default()),
        }
    }

    fn export<'a, R: Serialize>(
        &'a self,
        consumer: &str,
        include: impl Fn(&T) -> bool,
        row: impl Fn(&'a T) -> R,
    ) -> Option<Value> {
        if !self.finished {
            warn!("Summary \"{}\" exported before finish", consumer);
            return None;
        }
        let export = SummaryExport {
            overall: Row {
                label: OVERALL_LABEL,
                data: row(&self.overall),
            },
            items: self
                .items
                .iter()
                .filter(|(_, v)| include(v))
                .map(|(k, v)| (k.as_str(), row(v)))
                .collect(),
        };
        match serde_json::to_value(&export) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cannot serialize summary \"{}\": {}", consumer, e);
                None
            }
        }
    }
}

/// Apdex thresholds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApdexThresholds {
    pub satisfied_ms: i64,
    pub tolerated_ms: i64,
}

impl Default for ApdexThresholds {
    fn default() -> Self {
        Self {
            satisfied_ms: crate::defaults::APDEX_SATISFIED_MS,
            tolerated_ms: crate::defaults::APDEX_TOLERATED_MS,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct ApdexCounts {
    satisfied: u64,
    tolerated: u64,
    total: u64,
    thresholds: Option<ApdexThresholds>,
}

impl ApdexCounts {
    fn record(&mut self, sample: &Sample, thresholds: ApdexThresholds) {
        self.total += 1;
        if !sample.success() {
            return;
        }
        if sample.elapsed() <= thresholds.satisfied_ms {
            self.satisfied += 1;
        } else if sample.elapsed() <= thresholds.tolerated_ms {
            self.tolerated += 1;
        }
    }

    fn score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.satisfied as f64 + self.tolerated as f64 / 2.0) / self.total as f64
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApdexRow {
    apdex: f64,
    satisfied: u64,
    tolerated: u64,
    frustrated: u64,
    total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    satisfied_threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tolerated_threshold: Option<i64>,
}

/// Application Performance Index per label.
///
/// Successful samples at or under the satisfied threshold are satisfied,
/// at or under the tolerated threshold are tolerated; everything else,
/// including every failed sample, is frustrated.
pub struct ApdexSummaryConsumer {
    name: String,
    defaults: ApdexThresholds,
    overrides: HashMap<String, ApdexThresholds>,
    table: SummaryTable<ApdexCounts>,
}

impl ApdexSummaryConsumer {
    pub fn new(name: impl Into<String>, defaults: ApdexThresholds) -> Self {
        Self {
            name: name.into(),
            defaults,
            overrides: HashMap::new(),
            table: SummaryTable::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: HashMap<String, ApdexThresholds>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn thresholds_for(&self, label: &str) -> ApdexThresholds {
        self.overrides.get(label).copied().unwrap_or(self.defaults)
    }

    /// Score for `label`, or for all labels when `None`.
    pub fn score(&self, label: Option<&str>) -> Option<f64> {
        match label {
            None => Some(self.table.overall.score()),
            Some(label) => self.table.items.get(label).map(ApdexCounts::score),
        }
    }
}

impl SampleConsumer for ApdexSummaryConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.table.reset();
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        let thresholds = self.thresholds_for(sample.label());
        self.table.update_item(sample.label(), |item| {
            item.thresholds = Some(thresholds);
            item.record(sample, thresholds);
        });
        self.table.overall.record(sample, thresholds);
    }

    fn finish(&mut self, _out: &mut Emitter) {
        self.table.finished = true;
    }

    fn export_data(&self) -> Option<Value> {
        self.table.export(
            &self.name,
            |_| true,
            |counts| ApdexRow {
                apdex: counts.score(),
                satisfied: counts.satisfied,
                tolerated: counts.tolerated,
                frustrated: counts.total - counts.satisfied - counts.tolerated,
                total: counts.total,
                satisfied_threshold: counts.thresholds.map(|t| t.satisfied_ms),
                tolerated_threshold: counts.thresholds.map(|t| t.tolerated_ms),
            },
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct OutcomeCounts {
    samples: u64,
    errors: u64,
}

impl OutcomeCounts {
    fn record(&mut self, sample: &Sample) {
        self.samples += 1;
        if !sample.success() {
            self.errors += 1;
        }
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorRow {
    errors: u64,
    samples: u64,
    /// Share of all errors.
    errors_percent: f64,
    /// Share of all samples.
    samples_percent: f64,
}

/// Error counts per label; labels without errors are left out of `items`.
pub struct ErrorsSummaryConsumer {
    name: String,
    table: SummaryTable<OutcomeCounts>,
}

impl ErrorsSummaryConsumer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: SummaryTable::default(),
        }
    }
}

impl SampleConsumer for ErrorsSummaryConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.table.reset();
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        self.table.update_item(sample.label(), |item| item.record(sample));
        self.table.overall.record(sample);
    }

    fn finish(&mut self, _out: &mut Emitter) {
        self.table.finished = true;
    }

    fn export_data(&self) -> Option<Value> {
        let all = self.table.overall;
        self.table.export(
            &self.name,
            |counts| counts.errors > 0,
            |counts| ErrorRow {
                errors: counts.errors,
                samples: counts.samples,
                errors_percent: percent(counts.errors, all.errors),
                samples_percent: percent(counts.errors, all.samples),
            },
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestsRow {
    total: u64,
    ko: u64,
    ok: u64,
    ko_percent: f64,
    ok_percent: f64,
}

/// Pass/fail request counts.
pub struct RequestsSummaryConsumer {
    name: String,
    table: SummaryTable<OutcomeCounts>,
}

impl RequestsSummaryConsumer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: SummaryTable::default(),
        }
    }

    pub fn total(&self) -> u64 {
        self.table.overall.samples
    }
}

impl SampleConsumer for RequestsSummaryConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.table.reset();
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        self.table.update_item(sample.label(), |item| item.record(sample));
        self.table.overall.record(sample);
    }

    fn finish(&mut self, _out: &mut Emitter) {
        self.table.finished = true;
    }

    fn export_data(&self) -> Option<Value> {
        self.table.export(
            &self.name,
            |_| true,
            |counts| RequestsRow {
                total: counts.samples,
                ko: counts.errors,
                ok: counts.samples - counts.errors,
                ko_percent: percent(counts.errors, counts.samples),
                ok_percent: percent(counts.samples - counts.errors, counts.samples),
            },
        )
    }
}

/// Full statistics per label.
pub struct StatisticsSummaryConsumer {
    name: String,
    percentiles: Vec<f64>,
    table: SummaryTable<StatCalculator>,
}

impl StatisticsSummaryConsumer {
    pub fn new(name: impl Into<String>, percentiles: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            percentiles,
            table: SummaryTable::default(),
        }
    }

    pub fn stats(&self, label: &str) -> Option<&StatCalculator> {
        self.table.items.get(label)
    }

    pub fn overall(&self) -> &StatCalculator {
        &self.table.overall
    }
}

impl SampleConsumer for StatisticsSummaryConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.table.reset();
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        self.table.update_item(sample.label(), |stats| stats.add_sample(sample));
    }

    fn finish(&mut self, _out: &mut Emitter) {
        let mut overall = StatCalculator::new();
        for stats in self.table.items.values() {
            overall.merge(stats);
        }
        self.table.overall = overall;
        self.table.finished = true;
    }

    fn export_data(&self) -> Option<Value> {
        self.table
            .export(&self.name, |_| true, |stats| -> StatSummary { stats.summary(&self.percentiles) })
    }
}
