//! Root normalizer: the first consumer behind the sample source.

use super::consumer::{Emitter, SampleConsumer};
use crate::sample::Sample;

/// Trims surrounding whitespace from labels before fan-out.
///
/// Timing is passed through untouched; out-of-range elapsed times are
/// clamped only inside the histograms that record them.
pub struct NormalizerConsumer {
    name: String,
    rewritten: u64,
}

impl NormalizerConsumer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rewritten: 0,
        }
    }

    pub fn rewritten(&self) -> u64 {
        self.rewritten
    }
}

impl SampleConsumer for NormalizerConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, out: &mut Emitter) {
        let trimmed = sample.label().trim();
        if trimmed.len() == sample.label().len() {
            out.emit(sample.clone());
            return;
        }

        self.rewritten += 1;
        out.emit(sample.relabeled(trimmed));
    }
}
