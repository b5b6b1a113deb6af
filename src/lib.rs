//! # Load Test Report Library
//!
//! Aggregation and reporting for load-test results. A load test produces a
//! stream of samples (one per request: label, timing, outcome, bytes); this
//! library turns that stream into running per-label statistics, pass/fail
//! verdicts against non-functional requirements, and a report data context.
//!
//! ## Two Paths
//!
//! - **Live**: worker threads record samples into a [`LiveRegistry`] while
//!   the test runs. Each label owns a thread-safe [`MetricAccumulator`]
//!   backed by an HDR histogram, and [`NfrRule`]s can be evaluated against
//!   it at any time.
//! - **Batch**: after the test, a [`ReportGenerator`] reads the results file
//!   once through a push-based graph of consumers (filters, summaries,
//!   graphs) and exports everything into a [`DataContext`].
//!
//! ## Architecture Overview
//!
//! - `sample`: the measured request value type
//! - `metrics`: HDR histogram statistics and the thread-safe accumulator
//! - `nfr`: threshold rules and verdicts
//! - `registry`: label to accumulator map for the live path
//! - `persist`: CSV results writer used during a test
//! - `report`: consumer graph, summaries, graphs, source and generator
//! - `config`, `cli`: configuration file and command-line surface
//! - `logging`, `utils`: console output helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use loadtest_report::{ReportConfig, ReportGenerator};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let generator = ReportGenerator::new(ReportConfig::default());
//!     let (context, summary) = generator.generate(Path::new("results.csv"), Path::new("report"))?;
//!
//!     println!("{} rows read, {} skipped", summary.rows_read, summary.rows_skipped);
//!     println!("{}", context.to_json()["statisticsSummary"]["overall"]);
//!     Ok(())
//! }
//! ```

/// Command-line interface
///
/// Argument parsing with clap, including NFR rule parsing from
/// `label,criterion,symbol,value` strings.
pub mod cli;

/// Report configuration
///
/// JSON-deserialisable settings for label filters, Apdex thresholds, graphs
/// and input format, with defaults and validation.
pub mod config;

/// Typed errors for the report pipeline
pub mod error;

pub mod logging;

/// Performance measurement and statistical analysis
///
/// HDR histogram based statistics per label:
/// - Count, errors, min/max, mean, standard deviation
/// - Percentiles at bucket precision
/// - Order-independent merging of partial results
/// - Throughput and byte rates over the covered wall-clock span
pub mod metrics;

/// Non-functional requirement rules and verdicts
pub mod nfr;

pub mod persist;

/// Live aggregation shared by concurrent workers
///
/// A lifecycle-scoped registry created per test run. Also replays a results
/// file through a pool of worker threads to evaluate rules after the fact.
pub mod registry;

/// Batch report pipeline
///
/// Sample source, consumer graph, summary and graph consumers, and the
/// report generator that wires them together.
pub mod report;

pub mod sample;

pub mod utils;

pub use cli::Args;
pub use config::{ApdexConfig, GraphDefinition, ReportConfig};
pub use error::{GraphError, ReportError, SampleDecodeError};

/// Statistics types
///
/// `StatCalculator` is the single-owner statistic holder used by summary
/// consumers; `MetricAccumulator` wraps one for concurrent recording.
pub use metrics::{MetricAccumulator, StatCalculator, StatSummary};

pub use nfr::{NfrRule, Verdict};
pub use persist::{FlushResults, ResultWriter};
pub use registry::LiveRegistry;

/// Report pipeline entry points
pub use report::{DataContext, GenerationSummary, ReportGenerator, SampleSource};

pub use sample::Sample;

/// The current version of the report generator
///
/// Populated from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// Used by `ReportConfig::default()` and as command-line defaults.
pub mod defaults {
    /// Default Apdex satisfied threshold in milliseconds
    ///
    /// Successful samples at or under this elapsed time count as satisfied.
    pub const APDEX_SATISFIED_MS: i64 = 500;

    /// Default Apdex tolerated threshold in milliseconds
    ///
    /// Successful samples above the satisfied threshold and at or under
    /// this one count as tolerated; slower or failed samples are frustrated.
    pub const APDEX_TOLERATED_MS: i64 = 1500;

    /// Percentiles exported by the statistics summary
    pub const PERCENTILES: [f64; 3] = [90.0, 95.0, 99.0];

    /// Results file field delimiter
    pub const DELIMITER: char = ',';

    /// chrono format of the `beginDate` and `endDate` context keys
    pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

    /// Time bucket width of the default over-time graphs, in milliseconds
    pub const GRAPH_GRANULARITY_MS: i64 = 60_000;

    /// Default output directory
    pub const OUTPUT_DIR: &str = "report";

    /// Full data context written into the output directory
    pub const REPORT_DATA_FILE: &str = "report-data.json";

    /// Statistics summary alone, written next to the data context
    pub const STATISTICS_FILE: &str = "statistics.json";
}
