//! Error taxonomy for report generation.
//!
//! Only fatal conditions are represented here. Per-row decode problems and
//! out-of-range histogram values are absorbed by the component that detects
//! them and never reach the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors returned by the report pipeline.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The results file does not exist or cannot be opened.
    #[error("results file not found or unreadable: '{path}'")]
    SourceMissing { path: PathBuf },

    /// The results file exists but cannot be interpreted as a record stream.
    #[error("results file '{path}' is malformed: {reason}")]
    MalformedSource { path: PathBuf, reason: String },

    /// The results file is empty and no live collector will write to it.
    #[error("results file '{path}' is empty")]
    EmptySource { path: PathBuf },

    /// The consumer graph could not be built from configuration.
    #[error("invalid graph configuration at '{key}': {source}")]
    Graph {
        key: String,
        #[source]
        source: GraphError,
    },

    /// Report configuration failed validation.
    #[error("invalid report configuration: {0}")]
    InvalidConfig(String),

    /// The output directory exists and already holds files.
    #[error("output directory '{path}' is not empty")]
    OutputNotEmpty { path: PathBuf },

    /// Reading the stream failed after processing had started.
    #[error("error while processing samples from '{path}': {reason}")]
    Processing { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while wiring consumers together.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown graph class \"{0}\"")]
    UnknownClass(String),

    #[error("\"{property}\" is not a valid property for class \"{class}\"")]
    UnknownProperty { class: String, property: String },

    #[error("cannot assign \"{value}\" to property \"{property}\": {reason}")]
    UnassignableProperty {
        property: String,
        value: String,
        reason: String,
    },

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("consumer index {0} does not exist")]
    UnknownNode(usize),

    #[error("connecting \"{from}\" to \"{to}\" would create a cycle")]
    Cycle { from: String, to: String },

    #[error("consumer \"{name}\" expects {expected} input channel(s), channel {channel} was wired")]
    ChannelOutOfRange {
        name: String,
        channel: usize,
        expected: usize,
    },

    #[error("consumer \"{0}\" is not reachable from the root")]
    Unreachable(String),

    #[error("consumer \"{name}\" has {wired} of {expected} input channel(s) wired")]
    MissingInput {
        name: String,
        wired: usize,
        expected: usize,
    },

    #[error("duplicate consumer name \"{0}\"")]
    DuplicateName(String),
}

/// Reasons a single record could not be turned into a sample.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleDecodeError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field '{field}' has invalid value \"{value}\"")]
    InvalidField { field: &'static str, value: String },

    #[error("negative elapsed time {0}")]
    NegativeElapsed(i64),

    #[error("timestamp {timestamp} with elapsed time {elapsed} is outside the epoch-millisecond range")]
    TimestampOutOfRange { timestamp: i64, elapsed: i64 },

    #[error("record is not valid UTF-8 text")]
    Encoding,
}
