//! Live aggregation of samples produced by concurrent workers.
//!
//! The registry is created for one test run and handed to every worker.
//! Label lookups take a shared read lock; only the first sample of a new
//! label takes the write lock, and all per-sample work happens under that
//! label's own accumulator mutex. Workers that record many samples for the
//! same label can keep the `Arc<MetricAccumulator>` returned by
//! [`LiveRegistry::accumulator`] and skip the map lookup entirely.

use crate::error::ReportError;
use crate::metrics::{MetricAccumulator, StatCalculator};
use crate::nfr::{NfrRule, Verdict};
use crate::report::consumer::{Emitter, SampleConsumer};
use crate::report::source::{SampleSource, SourceStats};
use crate::sample::Sample;
use crossbeam::channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Samples buffered between the file reader and the replay workers.
const REPLAY_QUEUE_DEPTH: usize = 4096;

#[derive(Debug, Default)]
pub struct LiveRegistry {
    accumulators: RwLock<HashMap<String, Arc<MetricAccumulator>>>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator for `label`, created on first use.
    ///
    /// Two threads racing on a new label both get the same accumulator.
    pub fn accumulator(&self, label: &str) -> Arc<MetricAccumulator> {
        if let Some(existing) = self.accumulators.read().get(label) {
            return Arc::clone(existing);
        }
        let mut map = self.accumulators.write();
        Arc::clone(map.entry(label.to_string()).or_insert_with(|| {
            debug!("Creating accumulator for label \"{}\"", label);
            Arc::new(MetricAccumulator::new(label))
        }))
    }

    /// Record a sample under its own label.
    pub fn record(&self, sample: &Sample) {
        self.accumulator(sample.label()).add_sample(sample);
    }

    pub fn get(&self, label: &str) -> Option<Arc<MetricAccumulator>> {
        self.accumulators.read().get(label).cloned()
    }

    /// Check one rule. Labels without traffic yield a skipped verdict.
    pub fn evaluate(&self, rule: &NfrRule) -> Verdict {
        let snapshot = self.get(&rule.label).map(|acc| acc.snapshot());
        rule.check(snapshot.as_ref())
    }

    pub fn evaluate_all(&self, rules: &[NfrRule]) -> Vec<Verdict> {
        let verdicts: Vec<Verdict> = rules.iter().map(|rule| self.evaluate(rule)).collect();
        let failed = verdicts.iter().filter(|v| v.failed()).count();
        let skipped = verdicts.iter().filter(|v| v.skipped).count();
        info!(
            "Evaluated {} NFR rule(s): {} failed, {} skipped",
            verdicts.len(),
            failed,
            skipped
        );
        verdicts
    }

    /// Point-in-time copy of every label's statistics.
    pub fn snapshot(&self) -> BTreeMap<String, StatCalculator> {
        let accumulators: Vec<Arc<MetricAccumulator>> =
            self.accumulators.read().values().cloned().collect();
        accumulators
            .into_iter()
            .map(|acc| (acc.label().to_string(), acc.snapshot()))
            .collect()
    }

    /// All labels merged into one calculator.
    pub fn total(&self) -> StatCalculator {
        let mut total = StatCalculator::new();
        for stats in self.snapshot().values() {
            total.merge(stats);
        }
        total
    }

    pub fn len(&self) -> usize {
        self.accumulators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every label. Samples recorded into an accumulator handle that
    /// was obtained before the reset are lost.
    pub fn reset(&self) {
        let mut map = self.accumulators.write();
        debug!("Resetting live registry ({} labels)", map.len());
        map.clear();
    }

    /// Record every sample of a results file from `workers` threads.
    ///
    /// The calling thread decodes the file and hands samples to the workers
    /// over a bounded channel, so decoding and recording overlap the way
    /// they do when live workers record during a test.
    pub fn replay(&self, source: &SampleSource, workers: usize) -> Result<SourceStats, ReportError> {
        let workers = workers.max(1);
        let (sender, receiver) = bounded::<Sample>(REPLAY_QUEUE_DEPTH);
        info!(
            "Replaying {} into the live registry with {} worker(s)",
            source.path().display(),
            workers
        );

        let outcome = crossbeam::thread::scope(|scope| {
            for _ in 0..workers {
                let receiver = receiver.clone();
                scope.spawn(move |_| {
                    for sample in receiver.iter() {
                        self.record(&sample);
                    }
                });
            }
            drop(receiver);

            let mut sink = ChannelSink { sender };
            // Dropping the sink closes the channel and lets the workers exit.
            let result = source.run(&mut sink);
            drop(sink);
            result
        });

        match outcome {
            Ok(result) => result,
            Err(_) => Err(ReportError::Processing {
                path: source.path().to_path_buf(),
                reason: "replay worker panicked".to_string(),
            }),
        }
    }
}

/// Hands decoded samples to replay workers.
struct ChannelSink {
    sender: Sender<Sample>,
}

impl SampleConsumer for ChannelSink {
    fn name(&self) -> &str {
        "replay"
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        // Only fails once every worker is gone, which the scope reports.
        let _ = self.sender.send(sample.clone());
    }
}
