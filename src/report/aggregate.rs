//! Scalar reducers and the N-input merge consumer.

use super::consumer::{Emitter, SampleConsumer};
use crate::sample::Sample;
use serde_json::{json, Value};

/// Reduction applied to the selected value of every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Min,
    Max,
    Sum,
    Count,
    Mean,
}

/// Picks the value to reduce from a sample.
pub type SampleSelector = fn(&Sample) -> f64;

pub fn start_time(sample: &Sample) -> f64 {
    sample.start_time() as f64
}

pub fn end_time(sample: &Sample) -> f64 {
    sample.end_time() as f64
}

pub fn elapsed(sample: &Sample) -> f64 {
    sample.elapsed() as f64
}

/// Terminal consumer reducing one value over the whole stream.
pub struct AggregateConsumer {
    name: String,
    aggregator: Aggregator,
    selector: SampleSelector,
    value: Option<f64>,
    count: u64,
}

impl AggregateConsumer {
    pub fn new(name: impl Into<String>, aggregator: Aggregator, selector: SampleSelector) -> Self {
        Self {
            name: name.into(),
            aggregator,
            selector,
            value: None,
            count: 0,
        }
    }

    /// Reduced value, `None` if no sample was seen.
    pub fn result(&self) -> Option<f64> {
        match (self.aggregator, self.value) {
            (_, None) => None,
            (Aggregator::Mean, Some(sum)) => Some(sum / self.count as f64),
            (_, value) => value,
        }
    }
}

impl SampleConsumer for AggregateConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.value = None;
        self.count = 0;
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        let selected = (self.selector)(sample);
        self.count += 1;
        self.value = Some(match (self.aggregator, self.value) {
            (Aggregator::Count, current) => current.unwrap_or(0.0) + 1.0,
            (_, None) => selected,
            (Aggregator::Min, Some(current)) => current.min(selected),
            (Aggregator::Max, Some(current)) => current.max(selected),
            (Aggregator::Sum | Aggregator::Mean, Some(current)) => current + selected,
        });
    }

    fn export_data(&self) -> Option<Value> {
        Some(match self.result() {
            Some(v) => json!(v),
            None => Value::Null,
        })
    }
}

/// Forwards samples from any of its input channels and finishes only once
/// all of them have finished.
pub struct MergeConsumer {
    name: String,
    per_channel: Vec<u64>,
}

impl MergeConsumer {
    pub fn new(name: impl Into<String>, channels: usize) -> Self {
        Self {
            name: name.into(),
            per_channel: vec![0; channels.max(1)],
        }
    }
}

impl SampleConsumer for MergeConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_channels(&self) -> usize {
        self.per_channel.len()
    }

    fn consume(&mut self, sample: &Sample, channel: usize, out: &mut Emitter) {
        if let Some(count) = self.per_channel.get_mut(channel) {
            *count += 1;
        }
        out.emit(sample.clone());
    }

    fn export_data(&self) -> Option<Value> {
        Some(json!({ "receivedPerChannel": self.per_channel }))
    }
}
