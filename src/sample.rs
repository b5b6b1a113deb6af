//! Measured request samples.

use serde::{Deserialize, Serialize};

/// Response message prefix used by transaction controllers when the results
/// file carries no explicit controller column.
pub const CONTROLLER_MESSAGE_PREFIX: &str = "Number of samples in transaction";

/// One measured request/response event.
///
/// Samples are immutable once built: pipeline stages that need a different
/// shape build a new value instead of editing the one they received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    label: String,
    start_time: i64,
    end_time: i64,
    success: bool,
    bytes_received: i64,
    bytes_sent: i64,
    thread_name: String,
    controller: bool,
}

impl Sample {
    /// Create a sample from its start time (epoch ms) and elapsed time (ms).
    ///
    /// A negative elapsed time is treated as zero so that `end >= start`
    /// always holds.
    pub fn new(label: impl Into<String>, start_time: i64, elapsed: i64, success: bool) -> Self {
        let elapsed = elapsed.max(0);
        Self {
            label: label.into(),
            start_time,
            end_time: start_time.saturating_add(elapsed),
            success,
            bytes_received: 0,
            bytes_sent: 0,
            thread_name: String::new(),
            controller: false,
        }
    }

    /// Create a sample from explicit bounds. `end_time` is raised to
    /// `start_time` when it precedes it.
    pub fn from_bounds(label: impl Into<String>, start_time: i64, end_time: i64, success: bool) -> Self {
        Self::new(label, start_time, end_time.saturating_sub(start_time), success)
    }

    pub fn with_bytes(mut self, received: i64, sent: i64) -> Self {
        self.bytes_received = received.max(0);
        self.bytes_sent = sent.max(0);
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn with_controller(mut self, controller: bool) -> Self {
        self.controller = controller;
        self
    }

    /// Same measurement under another label.
    pub fn relabeled(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self.clone()
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Elapsed time in milliseconds, never negative.
    pub fn elapsed(&self) -> i64 {
        self.end_time - self.start_time
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn bytes_received(&self) -> i64 {
        self.bytes_received
    }

    pub fn bytes_sent(&self) -> i64 {
        self.bytes_sent
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Whether this sample was produced by a transaction controller that
    /// wraps child samples.
    pub fn is_controller(&self) -> bool {
        self.controller
    }
}
