//! Report orchestration: preconditions, graph wiring, the single pass over
//! the results file, data context assembly and output promotion.
//!
//! The consumer graph built for every report looks like this:
//!
//! ```text
//! normalizer ─┬─ beginDate
//!             ├─ endDate
//!             └─ nameFilter ─┬─ apdexSummary
//!                            ├─ requestsSummary
//!                            ├─ statisticsSummary
//!                            ├─ excludeControllerFilter ─┬─ errorsSummary
//!                            │                           └─ graphs excluding controllers
//!                            └─ other graphs
//! ```

use super::aggregate::{self, AggregateConsumer, Aggregator};
use super::consumer::{ConsumerGraph, NodeId, SampleConsumer};
use super::context::{DataContext, BEGIN_DATE_KEY, END_DATE_KEY, TEST_FILE_KEY, TIMEZONE_KEY};
use super::filter::{controller_predicate, label_predicate, FilterConsumer};
use super::graphs::GraphConsumer;
use super::normalizer::NormalizerConsumer;
use super::source::SampleSource;
use super::summary::{
    ApdexSummaryConsumer, ErrorsSummaryConsumer, RequestsSummaryConsumer, StatisticsSummaryConsumer,
};
use crate::config::ReportConfig;
use crate::error::{GraphError, ReportError};
use crate::persist::FlushResults;
use chrono::{Local, TimeZone};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const NORMALIZER: &str = "normalizer";
pub const BEGIN_DATE_CONSUMER: &str = "beginDate";
pub const END_DATE_CONSUMER: &str = "endDate";
pub const NAME_FILTER: &str = "nameFilter";
pub const EXCLUDE_CONTROLLER_FILTER: &str = "excludeControllerFilter";
pub const APDEX_SUMMARY: &str = "apdexSummary";
pub const REQUESTS_SUMMARY: &str = "requestsSummary";
pub const STATISTICS_SUMMARY: &str = "statisticsSummary";
pub const ERRORS_SUMMARY: &str = "errorsSummary";

/// Outcome counters of one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub samples_accepted: u64,
    pub output_dir: PathBuf,
}

/// Wired consumer graph plus the handles the generator reads back.
struct ReportGraph {
    graph: ConsumerGraph,
    begin: NodeId,
    end: NodeId,
    exported: Vec<(String, NodeId)>,
}

fn graph_error(key: impl Into<String>) -> impl FnOnce(GraphError) -> ReportError {
    let key = key.into();
    move |source| ReportError::Graph { key, source }
}

fn graph_definition_key(index: usize, error: &GraphError) -> String {
    match error {
        GraphError::UnknownClass(_) => format!("graphs[{}].className", index),
        GraphError::UnknownProperty { property, .. } | GraphError::UnassignableProperty { property, .. } => {
            format!("graphs[{}].properties.{}", index, property)
        }
        GraphError::DuplicateName(_) => format!("graphs[{}].name", index),
        _ => format!("graphs[{}]", index),
    }
}

/// Turns a results file into a data context and an output directory.
pub struct ReportGenerator {
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Generate a report from a complete results file.
    pub fn generate(
        &self,
        results: &Path,
        output_dir: &Path,
    ) -> Result<(DataContext, GenerationSummary), ReportError> {
        self.generate_inner(results, output_dir, None)
    }

    /// Generate a report from a file a live writer is still attached to.
    /// The writer is flushed before the file is read.
    pub fn generate_live(
        &self,
        results: &Path,
        output_dir: &Path,
        writer: &mut dyn FlushResults,
    ) -> Result<(DataContext, GenerationSummary), ReportError> {
        self.generate_inner(results, output_dir, Some(writer))
    }

    fn generate_inner(
        &self,
        results: &Path,
        output_dir: &Path,
        writer: Option<&mut dyn FlushResults>,
    ) -> Result<(DataContext, GenerationSummary), ReportError> {
        self.config.validate()?;

        if let Some(writer) = writer {
            if writer.results_path() != results {
                return Err(ReportError::InvalidConfig(format!(
                    "live writer targets '{}', not '{}'",
                    writer.results_path().display(),
                    results.display()
                )));
            }
            info!("Flushing live results writer before reading {}", results.display());
            writer.flush_results()?;
        }
        check_results_file(results)?;
        check_output_dir(output_dir)?;

        let mut report = self.build_graph()?;
        info!("Generating report from {}", results.display());
        let source = SampleSource::new(results)
            .with_delimiter(self.config.delimiter_byte())
            .with_timestamp_mode(self.config.timestamp_mode);
        let stats = source.run(&mut report.graph)?;

        let context = self.build_context(results, &report);
        write_output(&context, output_dir)?;

        let summary = GenerationSummary {
            rows_read: stats.rows_read,
            rows_skipped: stats.rows_skipped,
            samples_accepted: stats.samples_emitted,
            output_dir: output_dir.to_path_buf(),
        };
        info!(
            "Report written to {} ({} rows read, {} skipped)",
            output_dir.display(),
            summary.rows_read,
            summary.rows_skipped
        );
        Ok((context, summary))
    }

    fn build_graph(&self) -> Result<ReportGraph, ReportError> {
        let config = &self.config;
        let mut graph = ConsumerGraph::new();
        let mut exported = Vec::new();

        let root = graph
            .add(NormalizerConsumer::new(NORMALIZER))
            .map_err(graph_error(NORMALIZER))?;
        graph.set_root(root).map_err(graph_error(NORMALIZER))?;

        let begin = graph
            .add(AggregateConsumer::new(BEGIN_DATE_CONSUMER, Aggregator::Min, aggregate::start_time))
            .map_err(graph_error(BEGIN_DATE_CONSUMER))?;
        let end = graph
            .add(AggregateConsumer::new(END_DATE_CONSUMER, Aggregator::Max, aggregate::end_time))
            .map_err(graph_error(END_DATE_CONSUMER))?;

        let predicate = label_predicate(&config.included_samples, &config.excluded_samples)
            .map_err(graph_error("excludedSamples"))?;
        let name_filter = graph
            .add(FilterConsumer::new(NAME_FILTER, predicate))
            .map_err(graph_error(NAME_FILTER))?;
        let exclude_controllers = graph
            .add(FilterConsumer::new(EXCLUDE_CONTROLLER_FILTER, controller_predicate()).reversed())
            .map_err(graph_error(EXCLUDE_CONTROLLER_FILTER))?;

        for (id, key) in [(begin, BEGIN_DATE_CONSUMER), (end, END_DATE_CONSUMER), (name_filter, NAME_FILTER)] {
            graph.connect(root, id, 0).map_err(graph_error(key))?;
        }

        let summaries: [Box<dyn SampleConsumer>; 3] = [
            Box::new(
                ApdexSummaryConsumer::new(APDEX_SUMMARY, config.apdex.thresholds())
                    .with_overrides(config.apdex.overrides()),
            ),
            Box::new(RequestsSummaryConsumer::new(REQUESTS_SUMMARY)),
            Box::new(StatisticsSummaryConsumer::new(
                STATISTICS_SUMMARY,
                config.percentiles.clone(),
            )),
        ];
        for consumer in summaries {
            let name = consumer.name().to_string();
            let id = graph.add_boxed(consumer).map_err(graph_error(name.as_str()))?;
            graph.connect(name_filter, id, 0).map_err(graph_error(name.as_str()))?;
            exported.push((name, id));
        }

        graph
            .connect(name_filter, exclude_controllers, 0)
            .map_err(graph_error(EXCLUDE_CONTROLLER_FILTER))?;
        let errors = graph
            .add(ErrorsSummaryConsumer::new(ERRORS_SUMMARY))
            .map_err(graph_error(ERRORS_SUMMARY))?;
        graph
            .connect(exclude_controllers, errors, 0)
            .map_err(graph_error(ERRORS_SUMMARY))?;
        exported.push((ERRORS_SUMMARY.to_string(), errors));

        for (index, definition) in config.graphs.iter().enumerate() {
            let consumer = GraphConsumer::from_config(
                definition.name.as_str(),
                &definition.class_name,
                &definition.properties,
            )
            .map_err(|e| ReportError::Graph {
                key: graph_definition_key(index, &e),
                source: e,
            })?;
            let id = graph.add(consumer).map_err(|e| ReportError::Graph {
                key: graph_definition_key(index, &e),
                source: e,
            })?;
            let parent = if definition.excludes_controller_samples {
                exclude_controllers
            } else {
                name_filter
            };
            graph.connect(parent, id, 0).map_err(graph_error(format!("graphs[{}]", index)))?;
            debug!(
                "Graph \"{}\" ({}) attached to {}",
                definition.name,
                definition.class_name,
                if definition.excludes_controller_samples {
                    EXCLUDE_CONTROLLER_FILTER
                } else {
                    NAME_FILTER
                }
            );
            exported.push((definition.name.clone(), id));
        }

        graph.validate().map_err(graph_error("graphs"))?;
        debug!("Built consumer graph with {} consumers", graph.len());
        Ok(ReportGraph {
            graph,
            begin,
            end,
            exported,
        })
    }

    fn build_context(&self, results: &Path, report: &ReportGraph) -> DataContext {
        let format = self.config.date_format.as_str();
        let mut context = DataContext::new();
        context.put(TEST_FILE_KEY, results.display().to_string());
        context.put(BEGIN_DATE_KEY, format_timestamp(report.graph.export(report.begin), format));
        context.put(END_DATE_KEY, format_timestamp(report.graph.export(report.end), format));
        context.put(TIMEZONE_KEY, Local::now().offset().to_string());
        for (name, id) in &report.exported {
            match report.graph.export(*id) {
                Some(data) => {
                    context.put(name.as_str(), data);
                }
                None => warn!("Consumer \"{}\" exported no data", name),
            }
        }
        context
    }
}

/// Local-time rendering of an epoch-millisecond export, `null` when absent.
fn format_timestamp(exported: Option<Value>, format: &str) -> Value {
    exported
        .and_then(|v| v.as_f64())
        .and_then(|ms| Local.timestamp_millis_opt(ms as i64).single())
        .map(|t| Value::String(t.format(format).to_string()))
        .unwrap_or(Value::Null)
}

fn check_results_file(results: &Path) -> Result<(), ReportError> {
    let metadata = fs::metadata(results).map_err(|_| ReportError::SourceMissing {
        path: results.to_path_buf(),
    })?;
    if !metadata.is_file() {
        return Err(ReportError::SourceMissing {
            path: results.to_path_buf(),
        });
    }
    if metadata.len() == 0 {
        return Err(ReportError::EmptySource {
            path: results.to_path_buf(),
        });
    }
    Ok(())
}

fn check_output_dir(output_dir: &Path) -> Result<(), ReportError> {
    match fs::metadata(output_dir) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
        Ok(metadata) if !metadata.is_dir() => Err(ReportError::InvalidConfig(format!(
            "output path '{}' is not a directory",
            output_dir.display()
        ))),
        Ok(_) => {
            if fs::read_dir(output_dir)?.next().is_some() {
                Err(ReportError::OutputNotEmpty {
                    path: output_dir.to_path_buf(),
                })
            } else {
                Ok(())
            }
        }
    }
}

/// Write into a sibling temporary directory, then rename it into place.
/// The temporary directory is removed if anything fails.
fn write_output(context: &DataContext, output_dir: &Path) -> Result<(), ReportError> {
    let parent = match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let temp = parent.join(format!(".report-{}", Uuid::new_v4()));
    fs::create_dir(&temp)?;
    debug!("Writing report data to {}", temp.display());

    let result = populate(&temp, context).and_then(|_| promote(&temp, output_dir));
    if result.is_err() {
        if let Err(e) = fs::remove_dir_all(&temp) {
            warn!("Failed to remove temporary directory {}: {}", temp.display(), e);
        }
    }
    result
}

fn populate(dir: &Path, context: &DataContext) -> Result<(), ReportError> {
    fs::write(
        dir.join(crate::defaults::REPORT_DATA_FILE),
        serde_json::to_vec_pretty(context)?,
    )?;
    let statistics = context.get(STATISTICS_SUMMARY).cloned().unwrap_or(Value::Null);
    fs::write(
        dir.join(crate::defaults::STATISTICS_FILE),
        serde_json::to_vec_pretty(&statistics)?,
    )?;
    Ok(())
}

fn promote(temp: &Path, output_dir: &Path) -> Result<(), ReportError> {
    if output_dir.exists() {
        fs::remove_dir(output_dir)?;
    }
    fs::rename(temp, output_dir)?;
    Ok(())
}
