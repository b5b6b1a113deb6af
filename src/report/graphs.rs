//! Graph consumers and the class-name registry that builds them.
//!
//! A graph is configured as `{className, properties}`. The class name is
//! looked up in [`GRAPH_CLASSES`] and its factory turns the loose property
//! map into a typed [`GraphKind`]. Unknown classes, unknown properties and
//! values of the wrong shape are rejected here, before any sample flows.
//!
//! Every graph exports the same shape:
//!
//! ```json
//! { "kind": "HitsPerSecond", "granularity": 1000,
//!   "series": [ { "label": "Hits", "data": [[0, 2.0], [1000, 5.0]] } ] }
//! ```

use super::consumer::{Emitter, SampleConsumer};
use crate::error::GraphError;
use crate::metrics::StatCalculator;
use crate::sample::Sample;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Loose property map as found in configuration files.
pub type PropertyMap = BTreeMap<String, Value>;

type GraphFactory = fn(&str, &PropertyMap) -> Result<GraphKind, GraphError>;

/// Known graph classes, by configuration name.
pub const GRAPH_CLASSES: &[(&str, GraphFactory)] = &[
    ("ResponseTimeOverTime", response_time_over_time),
    ("ResponseTimeDistribution", response_time_distribution),
    ("HitsPerSecond", hits_per_second),
    ("BytesThroughputOverTime", bytes_throughput_over_time),
    ("ResponseTimePercentiles", response_time_percentiles),
];

const DEFAULT_TIME_GRANULARITY_MS: i64 = 60_000;
const DEFAULT_DISTRIBUTION_GRANULARITY_MS: i64 = 100;
const DEFAULT_GRAPH_PERCENTILES: [f64; 5] = [50.0, 75.0, 90.0, 95.0, 99.0];

const HITS_SERIES: &str = "Hits";
const RECEIVED_SERIES: &str = "Bytes received per second";
const SENT_SERIES: &str = "Bytes sent per second";

/// Typed configuration of one graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphKind {
    /// Mean elapsed time per label per time bucket.
    ResponseTimeOverTime { granularity_ms: i64 },
    /// Sample count per label per elapsed-time bucket.
    ResponseTimeDistribution { granularity_ms: i64 },
    /// Samples per second per time bucket, all labels together.
    HitsPerSecond { granularity_ms: i64 },
    /// Received and sent bytes per second per time bucket.
    BytesThroughputOverTime { granularity_ms: i64 },
    /// Requested percentiles of elapsed time per label.
    ResponseTimePercentiles { percentiles: Vec<f64> },
}

impl GraphKind {
    /// Resolve `class_name` and apply `properties` to it.
    ///
    /// Fully qualified names (`a.b.HitsPerSecondGraphConsumer`) resolve to
    /// the same class as their short form.
    pub fn from_config(class_name: &str, properties: &PropertyMap) -> Result<Self, GraphError> {
        let short = class_name.rsplit('.').next().unwrap_or(class_name);
        let short = short.strip_suffix("GraphConsumer").unwrap_or(short);
        GRAPH_CLASSES
            .iter()
            .find(|(name, _)| *name == short)
            .map(|(name, factory)| factory(name, properties))
            .unwrap_or_else(|| Err(GraphError::UnknownClass(class_name.to_string())))
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            GraphKind::ResponseTimeOverTime { .. } => "ResponseTimeOverTime",
            GraphKind::ResponseTimeDistribution { .. } => "ResponseTimeDistribution",
            GraphKind::HitsPerSecond { .. } => "HitsPerSecond",
            GraphKind::BytesThroughputOverTime { .. } => "BytesThroughputOverTime",
            GraphKind::ResponseTimePercentiles { .. } => "ResponseTimePercentiles",
        }
    }

    fn granularity_ms(&self) -> Option<i64> {
        match self {
            GraphKind::ResponseTimeOverTime { granularity_ms }
            | GraphKind::ResponseTimeDistribution { granularity_ms }
            | GraphKind::HitsPerSecond { granularity_ms }
            | GraphKind::BytesThroughputOverTime { granularity_ms } => Some(*granularity_ms),
            GraphKind::ResponseTimePercentiles { .. } => None,
        }
    }
}

fn check_properties(class: &str, properties: &PropertyMap, allowed: &[&str]) -> Result<(), GraphError> {
    match properties.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(property) => Err(GraphError::UnknownProperty {
            class: class.to_string(),
            property: property.clone(),
        }),
        None => Ok(()),
    }
}

fn unassignable(property: &str, value: &Value, reason: &str) -> GraphError {
    GraphError::UnassignableProperty {
        property: property.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Positive integer, given either as a JSON number or a numeric string.
fn granularity(properties: &PropertyMap, default: i64) -> Result<i64, GraphError> {
    let Some(value) = properties.get("granularity") else {
        return Ok(default);
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(ms) if ms > 0 => Ok(ms),
        Some(_) => Err(unassignable("granularity", value, "must be greater than zero")),
        None => Err(unassignable("granularity", value, "expected an integer number of milliseconds")),
    }
}

fn time_granularity(class: &str, properties: &PropertyMap) -> Result<i64, GraphError> {
    check_properties(class, properties, &["granularity"])?;
    granularity(properties, DEFAULT_TIME_GRANULARITY_MS)
}

fn response_time_over_time(class: &str, properties: &PropertyMap) -> Result<GraphKind, GraphError> {
    Ok(GraphKind::ResponseTimeOverTime {
        granularity_ms: time_granularity(class, properties)?,
    })
}

fn hits_per_second(class: &str, properties: &PropertyMap) -> Result<GraphKind, GraphError> {
    Ok(GraphKind::HitsPerSecond {
        granularity_ms: time_granularity(class, properties)?,
    })
}

fn bytes_throughput_over_time(class: &str, properties: &PropertyMap) -> Result<GraphKind, GraphError> {
    Ok(GraphKind::BytesThroughputOverTime {
        granularity_ms: time_granularity(class, properties)?,
    })
}

fn response_time_distribution(class: &str, properties: &PropertyMap) -> Result<GraphKind, GraphError> {
    check_properties(class, properties, &["granularity"])?;
    Ok(GraphKind::ResponseTimeDistribution {
        granularity_ms: granularity(properties, DEFAULT_DISTRIBUTION_GRANULARITY_MS)?,
    })
}

fn response_time_percentiles(class: &str, properties: &PropertyMap) -> Result<GraphKind, GraphError> {
    check_properties(class, properties, &["percentiles"])?;
    let Some(value) = properties.get("percentiles") else {
        return Ok(GraphKind::ResponseTimePercentiles {
            percentiles: DEFAULT_GRAPH_PERCENTILES.to_vec(),
        });
    };
    let items = value
        .as_array()
        .ok_or_else(|| unassignable("percentiles", value, "expected a list of numbers"))?;
    let mut percentiles = Vec::with_capacity(items.len());
    for item in items {
        match item.as_f64() {
            Some(p) if (0.0..=100.0).contains(&p) => percentiles.push(p),
            _ => return Err(unassignable("percentiles", value, "each entry must be a number in [0, 100]")),
        }
    }
    Ok(GraphKind::ResponseTimePercentiles { percentiles })
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    sum: f64,
    count: u64,
}

#[derive(Debug, Serialize)]
struct Series<'a> {
    label: &'a str,
    data: Vec<(f64, f64)>,
}

#[derive(Debug, Serialize)]
struct GraphExport<'a> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    granularity: Option<i64>,
    series: Vec<Series<'a>>,
}

/// Terminal consumer accumulating data for one configured graph.
pub struct GraphConsumer {
    name: String,
    kind: GraphKind,
    buckets: BTreeMap<String, BTreeMap<i64, Bucket>>,
    latencies: BTreeMap<String, StatCalculator>,
    finished: bool,
}

impl GraphConsumer {
    pub fn new(name: impl Into<String>, kind: GraphKind) -> Self {
        Self {
            name: name.into(),
            kind,
            buckets: BTreeMap::new(),
            latencies: BTreeMap::new(),
            finished: false,
        }
    }

    /// Build a graph consumer straight from configuration values.
    pub fn from_config(
        name: impl Into<String>,
        class_name: &str,
        properties: &PropertyMap,
    ) -> Result<Self, GraphError> {
        Ok(Self::new(name, GraphKind::from_config(class_name, properties)?))
    }

    pub fn kind(&self) -> &GraphKind {
        &self.kind
    }

    fn add(&mut self, series: &str, x: i64, value: f64) {
        let points = match self.buckets.get_mut(series) {
            Some(points) => points,
            None => self.buckets.entry(series.to_string()).or_default(),
        };
        let bucket = points.entry(x).or_default();
        bucket.sum += value;
        bucket.count += 1;
    }

    fn series(&self, y: impl Fn(&Bucket) -> f64) -> Vec<Series<'_>> {
        self.buckets
            .iter()
            .map(|(label, points)| Series {
                label,
                data: points.iter().map(|(x, b)| (*x as f64, y(b))).collect(),
            })
            .collect()
    }
}

fn floor_to(value: i64, granularity: i64) -> i64 {
    value.saturating_sub(value.rem_euclid(granularity))
}

impl SampleConsumer for GraphConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.buckets.clear();
        self.latencies.clear();
        self.finished = false;
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        match self.kind {
            GraphKind::ResponseTimeOverTime { granularity_ms } => {
                let x = floor_to(sample.start_time(), granularity_ms);
                self.add(sample.label(), x, sample.elapsed() as f64);
            }
            GraphKind::ResponseTimeDistribution { granularity_ms } => {
                let x = floor_to(sample.elapsed(), granularity_ms);
                self.add(sample.label(), x, 1.0);
            }
            GraphKind::HitsPerSecond { granularity_ms } => {
                let x = floor_to(sample.end_time(), granularity_ms);
                self.add(HITS_SERIES, x, 1.0);
            }
            GraphKind::BytesThroughputOverTime { granularity_ms } => {
                let x = floor_to(sample.end_time(), granularity_ms);
                self.add(RECEIVED_SERIES, x, sample.bytes_received() as f64);
                self.add(SENT_SERIES, x, sample.bytes_sent() as f64);
            }
            GraphKind::ResponseTimePercentiles { .. } => {
                match self.latencies.get_mut(sample.label()) {
                    Some(stats) => stats.add_value(sample.elapsed()),
                    None => self
                        .latencies
                        .entry(sample.label().to_string())
                        .or_default()
                        .add_value(sample.elapsed()),
                }
            }
        }
    }

    fn finish(&mut self, _out: &mut Emitter) {
        self.finished = true;
    }

    fn export_data(&self) -> Option<Value> {
        if !self.finished {
            warn!("Graph \"{}\" exported before finish", self.name);
            return None;
        }
        let series = match &self.kind {
            GraphKind::ResponseTimeOverTime { .. } => self.series(|b| b.sum / b.count as f64),
            GraphKind::ResponseTimeDistribution { .. } => self.series(|b| b.count as f64),
            GraphKind::HitsPerSecond { granularity_ms } => {
                let per_second = 1000.0 / *granularity_ms as f64;
                self.series(|b| b.count as f64 * per_second)
            }
            GraphKind::BytesThroughputOverTime { granularity_ms } => {
                let per_second = 1000.0 / *granularity_ms as f64;
                self.series(|b| b.sum * per_second)
            }
            GraphKind::ResponseTimePercentiles { percentiles } => self
                .latencies
                .iter()
                .map(|(label, stats)| Series {
                    label,
                    data: percentiles.iter().map(|&p| (p, stats.percentile(p) as f64)).collect(),
                })
                .collect(),
        };
        let export = GraphExport {
            kind: self.kind.class_name(),
            granularity: self.kind.granularity_ms(),
            series,
        };
        match serde_json::to_value(&export) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cannot serialize graph \"{}\": {}", self.name, e);
                None
            }
        }
    }
}
