//! Predicate-based filtering.

use super::consumer::{Emitter, SampleConsumer};
use crate::error::GraphError;
use crate::sample::Sample;
use std::collections::HashSet;

/// Pure test over a sample.
pub type SamplePredicate = Box<dyn Fn(&Sample) -> bool>;

/// Keeps samples whose label is in `included` (all labels when empty) and
/// not in `excluded`.
pub fn label_predicate(included: &[String], excluded: &[String]) -> Result<SamplePredicate, GraphError> {
    let included: HashSet<String> = included.iter().cloned().collect();
    let excluded: HashSet<String> = excluded.iter().cloned().collect();
    if let Some(both) = included.intersection(&excluded).next() {
        return Err(GraphError::InvalidPredicate(format!(
            "label \"{}\" is both included and excluded",
            both
        )));
    }
    Ok(Box::new(move |sample: &Sample| {
        (included.is_empty() || included.contains(sample.label())) && !excluded.contains(sample.label())
    }))
}

/// Matches transaction controller samples.
pub fn controller_predicate() -> SamplePredicate {
    Box::new(|sample: &Sample| sample.is_controller())
}

/// Forwards a sample iff `predicate(sample) != reversed`.
pub struct FilterConsumer {
    name: String,
    predicate: SamplePredicate,
    reversed: bool,
    passed: u64,
    rejected: u64,
}

impl FilterConsumer {
    pub fn new(name: impl Into<String>, predicate: SamplePredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
            reversed: false,
            passed: 0,
            rejected: 0,
        }
    }

    /// Invert the predicate: forward the samples it rejects.
    pub fn reversed(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    pub fn passed(&self) -> u64 {
        self.passed
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl SampleConsumer for FilterConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, out: &mut Emitter) {
        if (self.predicate)(sample) != self.reversed {
            self.passed += 1;
            out.emit(sample.clone());
        } else {
            self.rejected += 1;
        }
    }
}
