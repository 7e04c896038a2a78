//! Patch - owns node instances, connections and named arrays, and runs them

use alloc::collections::VecDeque;

use hashbrown::HashMap;
use petgraph::algo::toposort;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::EdgeRef;
use tracing::{debug, trace, warn};

use crate::config::Settings;
use crate::error::{CompileError, Result};
use crate::message::{Atom, Message};
use crate::node::{
    InletId, NodeIo, OutletId, PortKind, PortTopology, ProcessContext, RuntimeNode,
};
use crate::nodes::{NodeKind, NodeRegistry};

/// Unique identifier for a node within a patch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Connection {
    outlet: OutletId,
    inlet: InletId,
    kind: PortKind,
}

struct Slot {
    id: NodeId,
    node_type: String,
    topology: PortTopology,
    /// Empty while the node is handling a message
    node: Option<NodeKind>,
    /// Messages that arrived while the node was busy
    pending: VecDeque<(InletId, Message)>,
    /// Values of unconnected signal inlets
    inputs: Vec<f64>,
    outputs: Vec<f64>,
}

/// A message that left a node.
#[derive(Clone, Debug, PartialEq)]
pub struct Sent {
    pub node: NodeId,
    pub outlet: OutletId,
    pub message: Message,
}

/// Maximum number of messages queued on busy nodes during one [`Patch::send`].
pub const MAX_PENDING_DELIVERIES: usize = 64;

/// Executes nodes natively, with the same ordering the generated code has.
///
/// Messages are delivered synchronously and depth-first: when a node sends,
/// every receiver downstream runs to completion before the sender continues.
/// A message fed back into a node that is still handling one is queued and
/// handled right after, before control returns upstream. Feedback stops after
/// [`MAX_PENDING_DELIVERIES`] queued messages per [`send`](Patch::send).
///
/// Every message that leaves a node is recorded until drained with
/// [`take_sent`](Patch::take_sent). Long-running patches that never drain
/// should turn this off with [`set_recording`](Patch::set_recording).
///
/// Signal nodes are computed one sample per [`tick`](Patch::tick), in
/// dependency order.
pub struct Patch {
    graph: Graph<Slot, Connection>,
    /// Signal connections only, must stay acyclic
    signal_graph: DiGraphMap<NodeIndex, ()>,
    registry: NodeRegistry,
    ctx: ProcessContext,

    node_indices: HashMap<NodeId, NodeIndex>,
    next_node_id: u32,

    arrays: HashMap<String, Vec<f64>>,
    sent: Vec<Sent>,
    recording: bool,
    /// Messages queued on busy nodes since the last top-level send
    queued: usize,
}

impl Default for Patch {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

impl Patch {
    pub fn new(settings: &Settings) -> Self {
        Self::with_registry(settings, NodeRegistry::default())
    }

    pub fn with_registry(settings: &Settings, registry: NodeRegistry) -> Self {
        Self {
            graph: Graph::with_capacity(64, 64),
            signal_graph: DiGraphMap::new(),
            registry,
            ctx: ProcessContext {
                sample_rate: settings.sample_rate,
            },
            node_indices: HashMap::new(),
            next_node_id: 0,
            arrays: HashMap::new(),
            sent: Vec::new(),
            recording: true,
            queued: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.ctx.sample_rate
    }

    /// Instantiate a node from its type identifier and declaration arguments
    pub fn add(&mut self, node_type: &str, args: &[Atom]) -> Result<NodeId> {
        let instance = self.registry.instantiate(node_type, args)?;

        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let has_signal_ports = instance.topology.has_signal_ports();
        let idx = self.graph.add_node(Slot {
            id,
            node_type: instance.node_type,
            inputs: vec![0.0; instance.topology.inlets.len()],
            outputs: vec![0.0; instance.topology.outlets.len()],
            topology: instance.topology,
            node: Some(instance.node),
            pending: VecDeque::new(),
        });
        if has_signal_ports {
            self.signal_graph.add_node(idx);
        }
        self.node_indices.insert(id, idx);
        Ok(id)
    }

    fn index(&self, id: NodeId) -> Result<NodeIndex> {
        self.node_indices
            .get(&id)
            .copied()
            .ok_or_else(|| CompileError::InvalidConnection(format!("no node {:?}", id)))
    }

    /// Connect `outlet` of `from` to `inlet` of `to`.
    ///
    /// Both ports must exist and be of the same kind. Signal connections may
    /// not form a loop.
    pub fn connect(
        &mut self,
        from: NodeId,
        outlet: OutletId,
        to: NodeId,
        inlet: InletId,
    ) -> Result<()> {
        let from_idx = self.index(from)?;
        let to_idx = self.index(to)?;

        let source = self.graph[from_idx].topology.outlet(outlet);
        let sink = self.graph[to_idx].topology.inlet(inlet);
        let kind = match (source, sink) {
            (Some(a), Some(b)) if a == b => a,
            (Some(a), Some(b)) => {
                return Err(CompileError::InvalidConnection(format!(
                    "cannot connect {:?} outlet {} of [{}] to {:?} inlet {} of [{}]",
                    a,
                    outlet,
                    self.graph[from_idx].node_type,
                    b,
                    inlet,
                    self.graph[to_idx].node_type
                )))
            }
            (None, _) => {
                return Err(CompileError::InvalidConnection(format!(
                    "[{}] has no outlet {}",
                    self.graph[from_idx].node_type, outlet
                )))
            }
            (_, None) => {
                return Err(CompileError::InvalidConnection(format!(
                    "[{}] has no inlet {}",
                    self.graph[to_idx].node_type, inlet
                )))
            }
        };

        if kind == PortKind::Signal {
            self.signal_graph.add_edge(from_idx, to_idx, ());
            if toposort(&self.signal_graph, None).is_err() {
                self.signal_graph.remove_edge(from_idx, to_idx);
                return Err(CompileError::InvalidConnection(format!(
                    "connecting [{}] to [{}] creates a signal loop",
                    self.graph[from_idx].node_type, self.graph[to_idx].node_type
                )));
            }
        }

        self.graph.add_edge(from_idx, to_idx, Connection { outlet, inlet, kind });
        debug!("connected {:?}:{} -> {:?}:{} ({:?})", from, outlet, to, inlet, kind);
        Ok(())
    }

    /// Deliver `message` to `inlet` of `node` and run everything it triggers.
    pub fn send(&mut self, node: NodeId, inlet: InletId, message: Message) {
        self.queued = 0;
        match self.node_indices.get(&node) {
            Some(&idx) => self.deliver(idx, inlet, &message),
            None => warn!("message {} sent to unknown node {:?}", message, node),
        }
    }

    fn deliver(&mut self, idx: NodeIndex, inlet: InletId, message: &Message) {
        trace!("{} -> [{}] inlet {}", message, self.graph[idx].node_type, inlet);

        if self.graph[idx].topology.inlet(inlet) != Some(PortKind::Message) {
            debug!(
                "[{}] has no message inlet {}, dropping {}",
                self.graph[idx].node_type, inlet, message
            );
            return;
        }

        let Some(mut node) = self.graph[idx].node.take() else {
            if self.queued >= MAX_PENDING_DELIVERIES {
                warn!(
                    "feedback into [{}] exceeded {} messages, dropping {}",
                    self.graph[idx].node_type, MAX_PENDING_DELIVERIES, message
                );
                return;
            }
            self.queued += 1;
            trace!("[{}] is busy, queueing {}", self.graph[idx].node_type, message);
            self.graph[idx].pending.push_back((inlet, message.clone()));
            return;
        };

        node.receive(inlet, message, &mut Io { patch: self, from: idx });
        while let Some((inlet, message)) = self.graph[idx].pending.pop_front() {
            node.receive(inlet, &message, &mut Io { patch: self, from: idx });
        }
        self.graph[idx].node = Some(node);
    }

    fn emit(&mut self, from: NodeIndex, outlet: OutletId, message: Message) {
        let mut targets: Vec<(NodeIndex, InletId)> = self
            .graph
            .edges(from)
            .filter(|e| e.weight().outlet == outlet && e.weight().kind == PortKind::Message)
            .map(|e| (e.target(), e.weight().inlet))
            .collect();
        // edges come out newest first
        targets.reverse();

        if self.recording {
            self.sent.push(Sent {
                node: self.graph[from].id,
                outlet,
                message: message.clone(),
            });
        }
        for (to, inlet) in targets {
            self.deliver(to, inlet, &message);
        }
    }

    /// Turn recording of sent messages on or off. On by default.
    pub fn set_recording(&mut self, on: bool) {
        self.recording = on;
    }

    /// Drain every message sent so far, in the order they were sent
    pub fn take_sent(&mut self) -> Vec<Sent> {
        core::mem::take(&mut self.sent)
    }

    /// Messages sent so far on `outlet` of `node`
    pub fn sent_from(&self, node: NodeId, outlet: OutletId) -> Vec<Message> {
        self.sent
            .iter()
            .filter(|s| s.node == node && s.outlet == outlet)
            .map(|s| s.message.clone())
            .collect()
    }

    pub fn set_array(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.arrays.insert(name.into(), values);
    }

    pub fn array(&self, name: &str) -> Option<&[f64]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    /// Value used by an unconnected signal inlet
    pub fn set_signal(&mut self, node: NodeId, inlet: InletId, value: f64) {
        let Some(&idx) = self.node_indices.get(&node) else {
            return;
        };
        if let Some(input) = self.graph[idx].inputs.get_mut(inlet) {
            *input = value;
        }
    }

    /// Last value computed for a signal outlet
    pub fn signal(&self, node: NodeId, outlet: OutletId) -> Option<f64> {
        let idx = self.node_indices.get(&node)?;
        self.graph[*idx].outputs.get(outlet).copied()
    }

    /// Compute one sample for every signal node
    pub fn tick(&mut self) {
        let order = match toposort(&self.signal_graph, None) {
            Ok(order) => order,
            Err(cycle) => {
                warn!("signal loop through {:?}, skipping tick", cycle.node_id());
                return;
            }
        };

        for idx in order {
            let inputs = self.gather_inputs(idx);
            let slot = &mut self.graph[idx];
            match slot.node.as_mut() {
                Some(node) => node.process(&self.ctx, &inputs, &mut slot.outputs),
                None => warn!("[{}] is busy, skipping", slot.node_type),
            }
        }
    }

    fn gather_inputs(&self, idx: NodeIndex) -> Vec<f64> {
        let slot = &self.graph[idx];
        let mut inputs = slot.inputs.clone();
        let mut connected = vec![false; inputs.len()];

        for edge in self
            .graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .filter(|e| e.weight().kind == PortKind::Signal)
        {
            let Connection { outlet, inlet, .. } = *edge.weight();
            let value = self.graph[edge.source()].outputs[outlet];
            // connected signals are summed
            if connected[inlet] {
                inputs[inlet] += value;
            } else {
                inputs[inlet] = value;
                connected[inlet] = true;
            }
        }
        inputs
    }
}

struct Io<'a> {
    patch: &'a mut Patch,
    from: NodeIndex,
}

impl NodeIo for Io<'_> {
    fn send(&mut self, outlet: OutletId, message: Message) {
        self.patch.emit(self.from, outlet, message);
    }

    fn sample_rate(&self) -> f64 {
        self.patch.ctx.sample_rate
    }

    fn array(&self, name: &str) -> Option<&[f64]> {
        self.patch.array(name)
    }

    fn array_mut(&mut self, name: &str) -> Option<&mut [f64]> {
        self.patch.arrays.get_mut(name).map(Vec::as_mut_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{atoms, msg};

    #[test]
    fn rejects_mismatched_ports() {
        let mut patch = Patch::default();
        let msg = patch.add("msg", &atoms![1]).unwrap();
        let abs = patch.add("abs~", &[]).unwrap();

        assert!(matches!(
            patch.connect(msg, 0, abs, 0),
            Err(CompileError::InvalidConnection(_))
        ));
        assert!(matches!(
            patch.connect(msg, 1, msg, 0),
            Err(CompileError::InvalidConnection(_))
        ));
    }

    #[test]
    fn rejects_signal_loops() {
        let mut patch = Patch::default();
        let a = patch.add("abs~", &[]).unwrap();
        let b = patch.add("wrap~", &[]).unwrap();
        patch.connect(a, 0, b, 0).unwrap();
        assert!(patch.connect(b, 0, a, 0).is_err());
        // the failed connection leaves the patch runnable
        patch.set_signal(a, 0, -0.25);
        patch.tick();
        assert_eq!(patch.signal(b, 0), Some(0.25));
    }

    #[test]
    fn fan_out_follows_connection_order() {
        let mut patch = Patch::default();
        let source = patch.add("msg", &atoms!["$1"]).unwrap();
        let first = patch.add("msg", &atoms!["first", "$1"]).unwrap();
        let second = patch.add("msg", &atoms!["second", "$1"]).unwrap();
        patch.connect(source, 0, first, 0).unwrap();
        patch.connect(source, 0, second, 0).unwrap();

        patch.send(source, 0, msg![7]);
        let order: Vec<_> = patch.take_sent().into_iter().map(|s| s.message).collect();
        assert_eq!(order, vec![msg![7], msg!["first", 7], msg!["second", 7]]);
    }

    #[test]
    fn endless_feedback_is_bounded() {
        let mut patch = Patch::default();
        let a = patch.add("msg", &atoms!["$1"]).unwrap();
        patch.connect(a, 0, a, 0).unwrap();

        patch.send(a, 0, msg![1]);
        assert_eq!(patch.sent_from(a, 0).len(), MAX_PENDING_DELIVERIES + 1);

        // the bound is per send
        patch.take_sent();
        patch.send(a, 0, msg![2]);
        assert_eq!(patch.sent_from(a, 0).len(), MAX_PENDING_DELIVERIES + 1);
    }

    #[test]
    fn set_fed_back_while_busy_takes_effect() {
        let mut patch = Patch::default();
        let a = patch.add("msg", &atoms!["$1", ",", "second"]).unwrap();
        let b = patch.add("msg", &atoms!["set", "changed"]).unwrap();
        patch.connect(a, 0, b, 0).unwrap();
        patch.connect(b, 0, a, 0).unwrap();

        patch.send(a, 0, msg!["x"]);
        // templates swap only once the running ones are done
        assert_eq!(patch.sent_from(a, 0), vec![msg!["x"], msg!["second"]]);

        patch.take_sent();
        patch.send(a, 0, msg!["y"]);
        assert_eq!(patch.sent_from(a, 0), vec![msg!["changed"]]);
    }

    #[test]
    fn recording_can_be_turned_off() {
        let mut patch = Patch::default();
        patch.set_array("t", vec![0.0; 2]);
        let source = patch.add("msg", &atoms![5]).unwrap();
        let writer = patch.add("tabwrite", &atoms!["t"]).unwrap();
        patch.connect(source, 0, writer, 0).unwrap();

        patch.set_recording(false);
        patch.send(source, 0, Message::bang());
        assert!(patch.take_sent().is_empty());
        assert_eq!(patch.array("t"), Some(&[5.0, 0.0][..]));
    }

    #[test]
    fn messages_to_signal_inlets_are_dropped() {
        let mut patch = Patch::default();
        let abs = patch.add("abs~", &[]).unwrap();
        patch.send(abs, 0, msg![1]);
        assert!(patch.take_sent().is_empty());
    }
}
