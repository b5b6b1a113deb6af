//! Batch report pipeline.
//!
//! A [`SampleSource`](source::SampleSource) reads a results file and pushes
//! every sample into a [`ConsumerGraph`](consumer::ConsumerGraph). Filters
//! and the normalizer shape the stream; summary and graph consumers at the
//! leaves accumulate what ends up in the [`DataContext`](context::DataContext).
//! The [`ReportGenerator`](generator::ReportGenerator) wires all of it from a
//! [`ReportConfig`](crate::config::ReportConfig).

pub mod aggregate;
pub mod consumer;
pub mod context;
pub mod filter;
pub mod generator;
pub mod graphs;
pub mod normalizer;
pub mod source;
pub mod summary;

pub use consumer::{ConsumerGraph, Emitter, NodeId, SampleConsumer};
pub use context::DataContext;
pub use generator::{GenerationSummary, ReportGenerator};
pub use source::{SampleSource, SourceStats, TimestampMode};
