//! Report configuration.
//!
//! A [`ReportConfig`] can be loaded from a JSON file; every field has a
//! default, so an empty object `{}` is a valid configuration. Command-line
//! flags are layered on top with [`ReportConfig::apply_args`].

use crate::cli::Args;
use crate::error::ReportError;
use crate::report::graphs::PropertyMap;
use crate::report::source::TimestampMode;
use crate::report::summary::ApdexThresholds;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Apdex thresholds, globally and per label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApdexConfig {
    pub satisfied_threshold_ms: i64,
    pub tolerated_threshold_ms: i64,
    /// Per-label overrides of the thresholds above.
    pub per_label: BTreeMap<String, ApdexThresholds>,
}

impl Default for ApdexConfig {
    fn default() -> Self {
        Self {
            satisfied_threshold_ms: crate::defaults::APDEX_SATISFIED_MS,
            tolerated_threshold_ms: crate::defaults::APDEX_TOLERATED_MS,
            per_label: BTreeMap::new(),
        }
    }
}

impl ApdexConfig {
    pub fn thresholds(&self) -> ApdexThresholds {
        ApdexThresholds {
            satisfied_ms: self.satisfied_threshold_ms,
            tolerated_ms: self.tolerated_threshold_ms,
        }
    }

    pub fn overrides(&self) -> HashMap<String, ApdexThresholds> {
        self.per_label.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

/// One configured graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDefinition {
    pub name: String,
    pub class_name: String,
    #[serde(default)]
    pub properties: PropertyMap,
    #[serde(default)]
    pub excludes_controller_samples: bool,
}

impl GraphDefinition {
    pub fn new(name: &str, class_name: &str) -> Self {
        Self {
            name: name.to_string(),
            class_name: class_name.to_string(),
            properties: PropertyMap::new(),
            excludes_controller_samples: false,
        }
    }

    pub fn with_property(mut self, property: &str, value: serde_json::Value) -> Self {
        self.properties.insert(property.to_string(), value);
        self
    }

    pub fn excluding_controllers(mut self) -> Self {
        self.excludes_controller_samples = true;
        self
    }
}

/// Graphs generated when the configuration does not list any.
pub fn default_graphs() -> Vec<GraphDefinition> {
    vec![
        GraphDefinition::new("responseTimesOverTime", "ResponseTimeOverTime")
            .with_property("granularity", json!(crate::defaults::GRAPH_GRANULARITY_MS)),
        GraphDefinition::new("hitsPerSecond", "HitsPerSecond")
            .with_property("granularity", json!(crate::defaults::GRAPH_GRANULARITY_MS)),
        GraphDefinition::new("bytesThroughputOverTime", "BytesThroughputOverTime")
            .with_property("granularity", json!(crate::defaults::GRAPH_GRANULARITY_MS)),
        GraphDefinition::new("responseTimeDistribution", "ResponseTimeDistribution").excluding_controllers(),
        GraphDefinition::new("responseTimePercentiles", "ResponseTimePercentiles").excluding_controllers(),
    ]
}

/// Everything the report generator needs besides the file paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportConfig {
    /// Labels to keep; all labels when empty.
    pub included_samples: Vec<String>,
    /// Labels to drop.
    pub excluded_samples: Vec<String>,
    pub apdex: ApdexConfig,
    pub graphs: Vec<GraphDefinition>,
    /// Percentiles exported by the statistics summary.
    pub percentiles: Vec<f64>,
    pub delimiter: char,
    pub timestamp_mode: TimestampMode,
    /// chrono format string for `beginDate` and `endDate`.
    pub date_format: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            included_samples: Vec::new(),
            excluded_samples: Vec::new(),
            apdex: ApdexConfig::default(),
            graphs: default_graphs(),
            percentiles: crate::defaults::PERCENTILES.to_vec(),
            delimiter: crate::defaults::DELIMITER,
            timestamp_mode: TimestampMode::Start,
            date_format: crate::defaults::DATE_FORMAT.to_string(),
        }
    }
}

impl ReportConfig {
    /// Load a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ReportError::InvalidConfig(format!("cannot read '{}': {}", path.display(), e)))?;
        let config: ReportConfig = serde_json::from_str(&text)
            .map_err(|e| ReportError::InvalidConfig(format!("cannot parse '{}': {}", path.display(), e)))?;
        debug!("Loaded report configuration from {}", path.display());
        Ok(config)
    }

    /// Override file values with whatever was given on the command line.
    pub fn apply_args(&mut self, args: &Args) {
        if !args.include.is_empty() {
            self.included_samples = args.include.clone();
        }
        if !args.exclude.is_empty() {
            self.excluded_samples = args.exclude.clone();
        }
        if let Some(ms) = args.apdex_satisfied {
            self.apdex.satisfied_threshold_ms = ms;
        }
        if let Some(ms) = args.apdex_tolerated {
            self.apdex.tolerated_threshold_ms = ms;
        }
        if !args.percentiles.is_empty() {
            self.percentiles = args.percentiles.clone();
        }
        if let Some(delimiter) = args.delimiter {
            self.delimiter = delimiter;
        }
        if let Some(mode) = args.timestamp_mode {
            self.timestamp_mode = mode;
        }
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        validate_thresholds("apdex", &self.apdex.thresholds())?;
        for (label, thresholds) in &self.apdex.per_label {
            validate_thresholds(&format!("apdex.perLabel.{}", label), thresholds)?;
        }
        if let Some(p) = self.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(ReportError::InvalidConfig(format!(
                "percentile {} is outside [0, 100]",
                p
            )));
        }
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(ReportError::InvalidConfig(format!(
                "delimiter {:?} must be a single ASCII character other than a quote or line break",
                self.delimiter
            )));
        }
        if self.date_format.trim().is_empty()
            || StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error))
        {
            return Err(ReportError::InvalidConfig(format!(
                "dateFormat \"{}\" is not a valid date format",
                self.date_format
            )));
        }
        Ok(())
    }

    /// Delimiter as the byte the CSV reader expects. Only valid after
    /// [`validate`](Self::validate) succeeded.
    pub fn delimiter_byte(&self) -> u8 {
        let mut buf = [0u8; 4];
        self.delimiter.encode_utf8(&mut buf).as_bytes()[0]
    }
}

fn validate_thresholds(key: &str, thresholds: &ApdexThresholds) -> Result<(), ReportError> {
    if thresholds.satisfied_ms < 0 || thresholds.tolerated_ms < 0 {
        return Err(ReportError::InvalidConfig(format!(
            "{}: thresholds must not be negative",
            key
        )));
    }
    if thresholds.satisfied_ms > thresholds.tolerated_ms {
        return Err(ReportError::InvalidConfig(format!(
            "{}: satisfied threshold {} ms exceeds tolerated threshold {} ms",
            key, thresholds.satisfied_ms, thresholds.tolerated_ms
        )));
    }
    Ok(())
}
