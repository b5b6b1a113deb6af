//! Push-based consumer graph.
//!
//! Consumers live in an arena owned by [`ConsumerGraph`] and are addressed
//! by [`NodeId`]. Each consumer receives samples on numbered input channels
//! and hands whatever it wants to forward to an [`Emitter`]; the graph then
//! delivers those samples to the consumer's downstream edges in the order
//! they were connected. Delivery is depth-first per sample, so every
//! consumer observes samples in source order.
//!
//! A consumer is finished once every edge feeding it has finished. Samples
//! it emits from `finish` reach its children before they are finished.

use crate::error::GraphError;
use crate::sample::Sample;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

pub type NodeId = usize;

/// Collects the samples a consumer forwards downstream.
#[derive(Debug, Default)]
pub struct Emitter {
    samples: Vec<Sample>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    fn take(&mut self) -> Vec<Sample> {
        std::mem::take(&mut self.samples)
    }
}

/// One processing stage.
pub trait SampleConsumer {
    fn name(&self) -> &str;

    /// Number of input channels this consumer expects to be wired.
    fn input_channels(&self) -> usize {
        1
    }

    /// Called once before the first sample.
    fn start(&mut self) {}

    fn consume(&mut self, sample: &Sample, channel: usize, out: &mut Emitter);

    /// Called once after the last sample on every input channel.
    fn finish(&mut self, _out: &mut Emitter) {}

    /// Exported data, available after `finish`. Pass-through stages
    /// return `None`.
    fn export_data(&self) -> Option<Value> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    target: NodeId,
    channel: usize,
}

struct Node {
    consumer: Box<dyn SampleConsumer>,
    edges: Vec<Edge>,
    incoming: usize,
    pending: usize,
    started: bool,
    finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Finished,
}

/// Static DAG of consumers, fed through a single root.
pub struct ConsumerGraph {
    nodes: Vec<Node>,
    names: HashSet<String>,
    root: Option<NodeId>,
    state: RunState,
    delivered: u64,
}

impl Default for ConsumerGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            names: HashSet::new(),
            root: None,
            state: RunState::Idle,
            delivered: 0,
        }
    }

    /// Add a consumer. Names must be unique within the graph.
    pub fn add<C: SampleConsumer + 'static>(&mut self, consumer: C) -> Result<NodeId, GraphError> {
        self.add_boxed(Box::new(consumer))
    }

    pub fn add_boxed(&mut self, consumer: Box<dyn SampleConsumer>) -> Result<NodeId, GraphError> {
        let name = consumer.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(GraphError::DuplicateName(name));
        }
        let id = self.nodes.len();
        debug!("Adding consumer \"{}\" as node {}", name, id);
        self.nodes.push(Node {
            consumer,
            edges: Vec::new(),
            incoming: 0,
            pending: 0,
            started: false,
            finished: false,
        });
        Ok(id)
    }

    /// Make `id` the node the sample source feeds on channel 0.
    pub fn set_root(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.check_node(id)?;
        if let Some(previous) = self.root.replace(id) {
            self.nodes[previous].incoming -= 1;
        }
        self.nodes[id].incoming += 1;
        Ok(())
    }

    /// Wire `from`'s output into `to`'s input `channel`.
    pub fn connect(&mut self, from: NodeId, to: NodeId, channel: usize) -> Result<(), GraphError> {
        self.check_node(from)?;
        self.check_node(to)?;
        let expected = self.nodes[to].consumer.input_channels();
        if channel >= expected {
            return Err(GraphError::ChannelOutOfRange {
                name: self.name_of(to),
                channel,
                expected,
            });
        }
        if from == to || self.reaches(to, from) {
            return Err(GraphError::Cycle {
                from: self.name_of(from),
                to: self.name_of(to),
            });
        }
        self.nodes[from].edges.push(Edge { target: to, channel });
        self.nodes[to].incoming += 1;
        debug!(
            "Connected \"{}\" -> \"{}\" (channel {})",
            self.nodes[from].consumer.name(),
            self.nodes[to].consumer.name(),
            channel
        );
        Ok(())
    }

    /// Check that every consumer is reachable from the root and that every
    /// declared input channel has at least one producer.
    pub fn validate(&self) -> Result<(), GraphError> {
        let Some(root) = self.root else {
            return match self.nodes.first() {
                Some(node) => Err(GraphError::Unreachable(node.consumer.name().to_string())),
                None => Ok(()),
            };
        };

        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if reachable[id] {
                continue;
            }
            reachable[id] = true;
            stack.extend(self.nodes[id].edges.iter().map(|e| e.target));
        }
        if let Some(id) = reachable.iter().position(|r| !r) {
            return Err(GraphError::Unreachable(self.name_of(id)));
        }

        let mut wired: Vec<HashSet<usize>> = vec![HashSet::new(); self.nodes.len()];
        wired[root].insert(0);
        for node in &self.nodes {
            for edge in &node.edges {
                wired[edge.target].insert(edge.channel);
            }
        }
        for (id, node) in self.nodes.iter().enumerate() {
            let expected = node.consumer.input_channels();
            if wired[id].len() < expected {
                return Err(GraphError::MissingInput {
                    name: self.name_of(id),
                    wired: wired[id].len(),
                    expected,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.consumer.name() == name)
    }

    pub fn consumer(&self, id: NodeId) -> Option<&dyn SampleConsumer> {
        self.nodes.get(id).map(|n| n.consumer.as_ref())
    }

    pub fn export(&self, id: NodeId) -> Option<Value> {
        self.nodes.get(id).and_then(|n| n.consumer.export_data())
    }

    /// Samples delivered to the root so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn check_node(&self, id: NodeId) -> Result<(), GraphError> {
        if id < self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(id))
        }
    }

    fn name_of(&self, id: NodeId) -> String {
        self.nodes[id].consumer.name().to_string()
    }

    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if std::mem::replace(&mut seen[id], true) {
                continue;
            }
            stack.extend(self.nodes[id].edges.iter().map(|e| e.target));
        }
        false
    }

    fn start_node(&mut self, id: NodeId) {
        if std::mem::replace(&mut self.nodes[id].started, true) {
            return;
        }
        let node = &mut self.nodes[id];
        node.pending = node.incoming;
        node.consumer.start();
        for k in 0..self.nodes[id].edges.len() {
            let target = self.nodes[id].edges[k].target;
            self.start_node(target);
        }
    }

    fn deliver(&mut self, id: NodeId, sample: &Sample, channel: usize) {
        let mut out = Emitter::new();
        self.nodes[id].consumer.consume(sample, channel, &mut out);
        self.forward(id, out.take());
    }

    fn forward(&mut self, id: NodeId, samples: Vec<Sample>) {
        for sample in &samples {
            for k in 0..self.nodes[id].edges.len() {
                let Edge { target, channel } = self.nodes[id].edges[k];
                self.deliver(target, sample, channel);
            }
        }
    }

    /// One producer feeding `id` has finished.
    fn input_finished(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.pending = node.pending.saturating_sub(1);
        if node.pending > 0 || node.finished {
            return;
        }
        node.finished = true;
        let mut out = Emitter::new();
        node.consumer.finish(&mut out);
        self.forward(id, out.take());
        for k in 0..self.nodes[id].edges.len() {
            let target = self.nodes[id].edges[k].target;
            self.input_finished(target);
        }
    }
}

/// The graph is itself a consumer: the sample source drives it through
/// its root.
impl SampleConsumer for ConsumerGraph {
    fn name(&self) -> &str {
        "graph"
    }

    fn start(&mut self) {
        if self.state != RunState::Idle {
            warn!("Consumer graph started twice, ignoring");
            return;
        }
        self.state = RunState::Running;
        if let Some(root) = self.root {
            self.start_node(root);
        }
    }

    fn consume(&mut self, sample: &Sample, _channel: usize, _out: &mut Emitter) {
        if self.state != RunState::Running {
            warn!("Sample delivered to a graph that is not running, dropping it");
            return;
        }
        if let Some(root) = self.root {
            self.delivered += 1;
            self.deliver(root, sample, 0);
        }
    }

    fn finish(&mut self, _out: &mut Emitter) {
        if self.state != RunState::Running {
            warn!("Consumer graph finished while not running, ignoring");
            return;
        }
        self.state = RunState::Finished;
        if let Some(root) = self.root {
            self.input_finished(root);
        }
    }
}
