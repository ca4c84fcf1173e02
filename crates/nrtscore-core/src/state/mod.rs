//! Per-offset session state.
//!
//! Each offset the session touches owns a [`State`]: which nodes start and
//! stop there, the structural actions recorded there, and the node graph as
//! of that offset. The graph is only built when something asks for it.

pub mod graph;

pub use graph::{NodeAction, NodeGraph};

use crate::node::NodeId;
use crate::timing::AbsoluteOffset;
use std::collections::BTreeSet;

/// Materialization of a state's node graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Topology {
    /// Only the recorded actions are known.
    #[default]
    Sparse,
    /// The full graph as of this offset, after stops and actions here.
    Dense(NodeGraph),
}

/// Everything that happens at one session offset.
#[derive(Debug, Clone)]
pub struct State {
    offset: AbsoluteOffset,
    start_nodes: BTreeSet<NodeId>,
    stop_nodes: BTreeSet<NodeId>,
    actions: Vec<NodeAction>,
    topology: Topology,
}

impl State {
    pub(crate) fn new(offset: AbsoluteOffset) -> Self {
        Self {
            offset,
            start_nodes: BTreeSet::new(),
            stop_nodes: BTreeSet::new(),
            actions: Vec::new(),
            topology: Topology::Sparse,
        }
    }

    pub fn offset(&self) -> AbsoluteOffset {
        self.offset
    }

    /// Nodes whose start offset is this state's offset.
    pub fn start_nodes(&self) -> &BTreeSet<NodeId> {
        &self.start_nodes
    }

    /// Nodes whose stop offset is this state's offset.
    pub fn stop_nodes(&self) -> &BTreeSet<NodeId> {
        &self.stop_nodes
    }

    /// Structural actions recorded here, in call order.
    pub fn actions(&self) -> &[NodeAction] {
        &self.actions
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn is_dense(&self) -> bool {
        matches!(self.topology, Topology::Dense(_))
    }

    /// The materialized graph, if this state is dense.
    pub fn graph(&self) -> Option<&NodeGraph> {
        match &self.topology {
            Topology::Dense(graph) => Some(graph),
            Topology::Sparse => None,
        }
    }

    /// Whether anything structural happens here.
    pub fn is_empty(&self) -> bool {
        self.start_nodes.is_empty() && self.stop_nodes.is_empty() && self.actions.is_empty()
    }

    pub(crate) fn add_start(&mut self, node: NodeId) {
        self.start_nodes.insert(node);
    }

    pub(crate) fn add_stop(&mut self, node: NodeId) {
        self.stop_nodes.insert(node);
    }

    /// Log an action that has already been applied to the dense graph
    /// passed in as `graph`.
    pub(crate) fn record(&mut self, action: NodeAction, graph: NodeGraph) {
        self.actions.push(action);
        self.topology = Topology::Dense(graph);
    }

    /// Undo the latest [`record`](Self::record), restoring `graph`.
    pub(crate) fn unrecord(&mut self, graph: NodeGraph) {
        self.actions.pop();
        self.topology = Topology::Dense(graph);
    }

    pub(crate) fn materialize(&mut self, graph: NodeGraph) {
        self.topology = Topology::Dense(graph);
    }

    /// Drop the materialized graph; it is rebuilt from history on demand.
    pub(crate) fn invalidate(&mut self) {
        self.topology = Topology::Sparse;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::AddAction;

    #[test]
    fn test_new_state_is_sparse_and_empty() {
        let state = State::new(AbsoluteOffset::new(1.0));
        assert!(!state.is_dense());
        assert!(state.is_empty());
        assert!(state.graph().is_none());
    }

    #[test]
    fn test_record_keeps_action_log() {
        let mut state = State::new(AbsoluteOffset::ZERO);
        let action = NodeAction {
            source: NodeId(1),
            target: NodeId::ROOT,
            add_action: AddAction::AddToHead,
        };
        let mut graph = NodeGraph::new();
        graph.apply(&action, state.offset()).unwrap();
        state.record(action, graph);
        assert!(state.is_dense());
        assert_eq!(state.actions(), &[action]);

        state.invalidate();
        assert!(!state.is_dense());
        assert_eq!(state.actions().len(), 1);
    }
}
