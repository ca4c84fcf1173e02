//! The session timeline.
//!
//! A [`Session`] owns every node placed on it and one [`State`] per offset
//! that anything happens at. Node operations run against the offset opened
//! by the innermost [`Session::at`] call:
//!
//! ```ignore
//! let mut session = Session::default();
//! let mut moment = session.at(0.0)?;
//! let group = moment.add_group(NodeId::ROOT, GroupOptions::new().duration(4.0))?;
//! moment.add_synth(group, SynthOptions::new(synthdef).duration(1.0))?;
//! ```

use crate::bus::{Bus, BusAllocator, BusGroup, BusRate, ControlValue};
use crate::config::SessionOptions;
use crate::error::{Result, SessionError};
use crate::node::{GroupOptions, Node, NodeId, NodeKind, SynthOptions};
use crate::requests::AddAction;
use crate::state::{NodeAction, NodeGraph, State};
use crate::timing::AbsoluteOffset;
use std::collections::BTreeMap;
use std::ops::{Bound, Deref, DerefMut};

/// Timeline of nodes, their events and per-offset structure.
#[derive(Debug, Clone)]
pub struct Session {
    options: SessionOptions,
    nodes: Vec<Node>,
    states: BTreeMap<AbsoluteOffset, State>,
    active_moments: Vec<AbsoluteOffset>,
    buses: BusAllocator,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        let mut initial = State::new(AbsoluteOffset::ZERO);
        initial.materialize(NodeGraph::new());
        let mut states = BTreeMap::new();
        states.insert(AbsoluteOffset::ZERO, initial);
        Self {
            buses: BusAllocator::new(&options),
            options,
            nodes: vec![Node::root()],
            states,
            active_moments: Vec::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// All nodes in creation order, root first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(SessionError::UnknownNode(id))
    }

    pub fn states(&self) -> &BTreeMap<AbsoluteOffset, State> {
        &self.states
    }

    pub fn state(&self, offset: f64) -> Result<&State> {
        self.states
            .get(&AbsoluteOffset::new(offset))
            .ok_or(SessionError::UntrackedOffset(offset))
    }

    /// Allocate one bus for the whole session.
    pub fn add_bus(&mut self, rate: BusRate) -> Result<Bus> {
        Ok(self.add_bus_group(rate, 1)?.first())
    }

    /// Allocate `count` consecutive buses for the whole session.
    pub fn add_bus_group(&mut self, rate: BusRate, count: usize) -> Result<BusGroup> {
        let group = self.buses.allocate(rate, count)?;
        log::debug!(
            "[SESSION] Allocated {:?} buses {}..{}",
            rate,
            group.index(),
            group.index() as usize + group.len()
        );
        Ok(group)
    }

    /// Hardware input channels, `None` when the session reads no input.
    pub fn audio_input_bus_group(&self) -> Option<BusGroup> {
        self.buses.input_bus_group()
    }

    /// Hardware output channels, `None` when the session writes no output.
    pub fn audio_output_bus_group(&self) -> Option<BusGroup> {
        self.buses.output_bus_group()
    }

    /// Open `offset` as the receiver of node operations until the returned
    /// guard is dropped.
    pub fn at(&mut self, offset: f64) -> Result<Moment<'_>> {
        if !offset.is_finite() || offset < 0.0 {
            return Err(SessionError::InvalidOffset(offset));
        }
        let offset = AbsoluteOffset::new(offset);
        self.ensure_state(offset);
        self.active_moments.push(offset);
        log::trace!(
            "[SESSION] Entered moment {} (depth {})",
            offset,
            self.active_moments.len()
        );
        Ok(Moment {
            session: self,
            offset,
        })
    }

    /// Offset of the innermost open moment.
    pub fn active_offset(&self) -> Result<AbsoluteOffset> {
        self.active_moments
            .last()
            .copied()
            .ok_or(SessionError::NoActiveMoment)
    }

    /// Create a group at the active offset, placed against `target`.
    pub fn add_group(&mut self, target: NodeId, options: GroupOptions) -> Result<NodeId> {
        let offset = self.active_offset()?;
        let duration = checked_duration(options.duration)?;
        self.add_node(target, options.add_action, NodeKind::Group, offset, duration)
    }

    /// Create a synth at the active offset, placed against `target`.
    ///
    /// Initial controls must be declared by the synth definition.
    pub fn add_synth(&mut self, target: NodeId, options: SynthOptions) -> Result<NodeId> {
        let offset = self.active_offset()?;
        let duration = checked_duration(options.duration)?;
        if let Some(name) = options
            .controls
            .keys()
            .find(|name| options.synthdef.parameter(name).is_none())
        {
            return Err(SessionError::UnknownParameter {
                node: NodeId(self.nodes.len()),
                name: name.clone(),
            });
        }
        let kind = NodeKind::Synth {
            synthdef: options.synthdef,
            settings: options.controls,
        };
        self.add_node(target, options.add_action, kind, offset, duration)
    }

    /// Move an existing node against `target` at the active offset.
    pub fn move_node(&mut self, target: NodeId, node: NodeId, add_action: AddAction) -> Result<()> {
        let offset = self.active_offset()?;
        self.node(node)?;
        self.require_present(node, offset)?;
        self.require_present(target, offset)?;
        self.record(
            offset,
            NodeAction {
                source: node,
                target,
                add_action,
            },
        )?;
        log::debug!(
            "[SESSION] Moved {} {:?} {} at {}",
            node,
            add_action,
            target,
            offset
        );
        Ok(())
    }

    /// `[node, parent, ..., root]` at the active offset.
    pub fn parentage(&mut self, node: NodeId) -> Result<Vec<NodeId>> {
        let offset = self.active_offset()?;
        self.node(node)?;
        self.graph(offset)?
            .parentage(node)
            .ok_or(SessionError::NodeNotPresent {
                node,
                offset: offset.as_f64(),
            })
    }

    /// Value of attribute `name` of `node` at the active offset.
    pub fn get(&self, node: NodeId, name: &str) -> Result<Option<ControlValue>> {
        let offset = self.active_offset()?;
        let node = self.checked_attribute(node, name)?;
        Ok(node.get_at(node.relative_offset(offset), name))
    }

    /// Set attribute `name` of `node` at the active offset.
    ///
    /// Values are numbers or buses the control reads from. Offsets outside
    /// the node's lifetime are ignored.
    pub fn set(&mut self, node: NodeId, name: &str, value: impl Into<ControlValue>) -> Result<()> {
        let offset = self.active_offset()?;
        self.checked_attribute(node, name)?;
        let value = value.into();
        let node = &mut self.nodes[node.0];
        let relative = node.relative_offset(offset);
        if node.set_at(relative, name, value) {
            log::trace!("[SESSION] {}.{} = {} at {}", node.id(), name, value, offset);
        }
        Ok(())
    }

    /// Node graph as of `offset`, after the stops and actions there.
    pub fn graph_at(&mut self, offset: f64) -> Result<&NodeGraph> {
        self.graph(AbsoluteOffset::new(offset))
    }

    /// Materialize the node graph of the state at `offset`.
    ///
    /// Starts from the nearest earlier dense state (or the bare root) and
    /// replays every state in between. A dense state is left untouched.
    pub fn desparsify(&mut self, offset: f64) -> Result<()> {
        self.materialize(AbsoluteOffset::new(offset))
    }

    fn graph(&mut self, offset: AbsoluteOffset) -> Result<&NodeGraph> {
        self.materialize(offset)?;
        self.states
            .get(&offset)
            .and_then(State::graph)
            .ok_or(SessionError::UntrackedOffset(offset.as_f64()))
    }

    fn materialize(&mut self, offset: AbsoluteOffset) -> Result<()> {
        let state = self
            .states
            .get(&offset)
            .ok_or(SessionError::UntrackedOffset(offset.as_f64()))?;
        if state.is_dense() {
            return Ok(());
        }

        let base = self
            .states
            .range(..offset)
            .rev()
            .find_map(|(_, state)| state.graph().map(|graph| (state, graph.clone())));
        let (mut graph, lower) = match base {
            Some((state, graph)) => {
                let mut graph = graph;
                leave(&mut graph, state);
                (graph, Bound::Excluded(state.offset()))
            }
            None => (NodeGraph::new(), Bound::Unbounded),
        };

        let mut replayed = 0;
        for state in self.states.range((lower, Bound::Excluded(offset))).map(|(_, s)| s) {
            self.enter(&mut graph, state)?;
            leave(&mut graph, state);
            replayed += 1;
        }
        self.enter(&mut graph, state)?;
        log::trace!(
            "[SESSION] Desparsified {} ({} intermediate states)",
            offset,
            replayed
        );

        if let Some(state) = self.states.get_mut(&offset) {
            state.materialize(graph);
        }
        Ok(())
    }

    /// Advance `graph` into `state`: retire what stops there, then replay
    /// its actions.
    pub(crate) fn enter(&self, graph: &mut NodeGraph, state: &State) -> Result<()> {
        for node in state.stop_nodes() {
            if !state.start_nodes().contains(node) {
                graph.remove_subtree(*node);
            }
        }
        for action in state.actions() {
            self.replay(graph, action, state.offset())?;
        }
        Ok(())
    }

    fn replay(&self, graph: &mut NodeGraph, action: &NodeAction, offset: AbsoluteOffset) -> Result<()> {
        graph.apply(action, offset)?;
        if self.node(action.source)?.is_group() {
            graph.mark_group(action.source);
        }
        Ok(())
    }

    /// Apply `action` to the graph at `offset` and log it there.
    ///
    /// Later states must still replay on top of the change; otherwise the
    /// action is rejected and the session is left as it was.
    fn record(&mut self, offset: AbsoluteOffset, action: NodeAction) -> Result<()> {
        let previous = self.graph(offset)?.clone();
        let mut graph = previous.clone();
        self.replay(&mut graph, &action, offset)?;
        if let Some(state) = self.states.get_mut(&offset) {
            state.record(action, graph);
        }
        self.invalidate_after(offset);

        let last = self.states.keys().next_back().copied();
        if let Some(last) = last.filter(|last| *last > offset) {
            if let Err(err) = self.materialize(last) {
                log::debug!(
                    "[SESSION] Rejected {:?} at {}: later history breaks ({})",
                    action,
                    offset,
                    err
                );
                if let Some(state) = self.states.get_mut(&offset) {
                    state.unrecord(previous);
                }
                self.invalidate_after(offset);
                return Err(err);
            }
        }
        Ok(())
    }

    fn add_node(
        &mut self,
        target: NodeId,
        add_action: AddAction,
        kind: NodeKind,
        offset: AbsoluteOffset,
        duration: f64,
    ) -> Result<NodeId> {
        self.node(target)?;
        self.require_present(target, offset)?;

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, kind, offset, duration));
        let action = NodeAction {
            source: id,
            target,
            add_action,
        };
        if let Err(err) = self.record(offset, action) {
            self.nodes.pop();
            return Err(err);
        }

        self.ensure_state(offset).add_start(id);
        let stop = offset.advance(duration);
        if stop.is_finite() {
            self.ensure_state(stop).add_stop(id);
            self.invalidate_after(offset);
        }
        log::debug!(
            "[SESSION] Added {} {:?} {} at {} for {}s",
            id,
            add_action,
            target,
            offset,
            duration
        );
        Ok(id)
    }

    fn require_present(&mut self, node: NodeId, offset: AbsoluteOffset) -> Result<()> {
        if self.graph(offset)?.contains(node) {
            Ok(())
        } else {
            Err(SessionError::NodeNotPresent {
                node,
                offset: offset.as_f64(),
            })
        }
    }

    fn checked_attribute(&self, node: NodeId, name: &str) -> Result<&Node> {
        let found = self.node(node)?;
        if found.accepts(name) {
            Ok(found)
        } else {
            Err(SessionError::UnknownParameter {
                node,
                name: name.to_string(),
            })
        }
    }

    fn ensure_state(&mut self, offset: AbsoluteOffset) -> &mut State {
        self.states
            .entry(offset)
            .or_insert_with(|| State::new(offset))
    }

    /// Drop materialized graphs later than `offset`.
    fn invalidate_after(&mut self, offset: AbsoluteOffset) {
        for state in self
            .states
            .range_mut((Bound::Excluded(offset), Bound::Unbounded))
            .map(|(_, s)| s)
        {
            state.invalidate();
        }
    }
}

/// Leave `state` for a later one: nodes that started and stopped there are
/// gone afterwards.
pub(crate) fn leave(graph: &mut NodeGraph, state: &State) {
    for node in state.start_nodes().intersection(state.stop_nodes()) {
        graph.remove_subtree(*node);
    }
}

fn checked_duration(duration: Option<f64>) -> Result<f64> {
    match duration {
        None => Ok(f64::INFINITY),
        Some(d) if d >= 0.0 => Ok(d),
        Some(d) => Err(SessionError::InvalidDuration(d)),
    }
}

/// Scope guard returned by [`Session::at`].
///
/// Derefs to the session; dropping it closes the moment.
#[derive(Debug)]
pub struct Moment<'a> {
    session: &'a mut Session,
    offset: AbsoluteOffset,
}

impl Moment<'_> {
    pub fn offset(&self) -> AbsoluteOffset {
        self.offset
    }
}

impl Deref for Moment<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for Moment<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for Moment<'_> {
    fn drop(&mut self) {
        self.session.active_moments.pop();
        log::trace!("[SESSION] Left moment {}", self.offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrtscore_dsp::{dc_synthdef, default_synthdef};
    use std::sync::Arc;

    fn dc() -> SynthOptions {
        SynthOptions::new(Arc::new(dc_synthdef().unwrap()))
    }

    #[test]
    fn test_operations_need_a_moment() {
        let mut session = Session::default();
        assert!(matches!(
            session.add_group(NodeId::ROOT, GroupOptions::new()),
            Err(SessionError::NoActiveMoment)
        ));
        assert!(matches!(
            session.set(NodeId(1), "pan", 0.0),
            Err(SessionError::NoActiveMoment)
        ));
    }

    #[test]
    fn test_invalid_offsets() {
        let mut session = Session::default();
        assert!(session.at(-1.0).is_err());
        assert!(session.at(f64::NAN).is_err());
        assert!(session.at(f64::INFINITY).is_err());
    }

    #[test]
    fn test_nested_moments() {
        let mut session = Session::default();
        let mut outer = session.at(1.0).unwrap();
        assert_eq!(outer.active_offset().unwrap(), AbsoluteOffset::new(1.0));
        {
            let inner = outer.at(3.0).unwrap();
            assert_eq!(inner.active_offset().unwrap(), AbsoluteOffset::new(3.0));
        }
        assert_eq!(outer.active_offset().unwrap(), AbsoluteOffset::new(1.0));
        drop(outer);
        assert!(session.active_offset().is_err());
    }

    #[test]
    fn test_add_registers_start_and_stop() {
        let mut session = Session::default();
        let synth = {
            let mut moment = session.at(1.0).unwrap();
            moment.add_synth(NodeId::ROOT, dc().duration(2.0)).unwrap()
        };
        assert!(session.state(1.0).unwrap().start_nodes().contains(&synth));
        assert!(session.state(3.0).unwrap().stop_nodes().contains(&synth));
        assert!(session.graph_at(1.0).unwrap().contains(synth));
        assert!(!session.graph_at(3.0).unwrap().contains(synth));
    }

    #[test]
    fn test_infinite_nodes_have_no_stop_state() {
        let mut session = Session::default();
        let mut moment = session.at(0.0).unwrap();
        moment.add_group(NodeId::ROOT, GroupOptions::new()).unwrap();
        drop(moment);
        assert_eq!(session.states().len(), 1);
    }

    #[test]
    fn test_unknown_control_rejected() {
        let mut session = Session::default();
        let mut moment = session.at(0.0).unwrap();
        let result = moment.add_synth(NodeId::ROOT, dc().control("frequency", 1.0));
        assert!(matches!(result, Err(SessionError::UnknownParameter { .. })));
        assert_eq!(moment.nodes().len(), 1);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let mut session = Session::default();
        let mut moment = session.at(0.0).unwrap();
        assert!(matches!(
            moment.add_group(NodeId::ROOT, GroupOptions::new().duration(-1.0)),
            Err(SessionError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_target_must_be_present() {
        let mut session = Session::default();
        let group = {
            let mut moment = session.at(0.0).unwrap();
            moment
                .add_group(NodeId::ROOT, GroupOptions::new().duration(1.0))
                .unwrap()
        };
        let mut moment = session.at(2.0).unwrap();
        assert!(matches!(
            moment.add_synth(group, dc()),
            Err(SessionError::NodeNotPresent { .. })
        ));
        assert!(matches!(
            moment.add_synth(NodeId(42), dc()),
            Err(SessionError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_get_and_set_are_relative_to_node_start() {
        let mut session = Session::default();
        let synthdef = Arc::new(default_synthdef().unwrap());
        let synth = {
            let mut moment = session.at(2.0).unwrap();
            moment
                .add_synth(
                    NodeId::ROOT,
                    SynthOptions::new(synthdef)
                        .duration(4.0)
                        .control("frequency", 220.0),
                )
                .unwrap()
        };
        {
            let mut moment = session.at(3.0).unwrap();
            assert_eq!(moment.get(synth, "frequency").unwrap(), Some(ControlValue::Number(220.0)));
            moment.set(synth, "frequency", 330.0).unwrap();
        }
        let events = session.node(synth).unwrap().events("frequency").unwrap();
        assert_eq!(
            events.at(crate::timing::RelativeOffset::new(1.0)),
            Some(ControlValue::Number(330.0))
        );

        let moment = session.at(2.5).unwrap();
        assert_eq!(moment.get(synth, "frequency").unwrap(), Some(ControlValue::Number(220.0)));
        assert!(matches!(
            moment.get(synth, "cutoff"),
            Err(SessionError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_set_at_rounded_stop_offset() {
        let mut session = Session::default();
        let synthdef = Arc::new(default_synthdef().unwrap());
        let synth = {
            let mut moment = session.at(0.1).unwrap();
            moment
                .add_synth(NodeId::ROOT, SynthOptions::new(synthdef).duration(0.2))
                .unwrap()
        };
        let stop = session.node(synth).unwrap().stop_offset();
        let mut moment = session.at(stop.as_f64()).unwrap();
        moment.set(synth, "frequency", 660.0).unwrap();
        assert_eq!(moment.get(synth, "frequency").unwrap(), Some(ControlValue::Number(660.0)));
        drop(moment);
        let events = session.node(synth).unwrap().events("frequency").unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_bus_mapped_controls() {
        let mut session = Session::new(SessionOptions::with_channels(2, 2));
        let bus = session.add_bus(BusRate::Control).unwrap();
        let group = session.add_bus_group(BusRate::Audio, 2).unwrap();
        assert_eq!(bus.index(), 0);
        assert_eq!(group.index(), 4);
        assert_eq!(session.audio_input_bus_group().unwrap().index(), 2);
        assert_eq!(session.audio_output_bus_group().unwrap().len(), 2);

        let synthdef = Arc::new(default_synthdef().unwrap());
        let mut moment = session.at(0.0).unwrap();
        let synth = moment
            .add_synth(
                NodeId::ROOT,
                SynthOptions::new(synthdef).control("out", group),
            )
            .unwrap();
        moment.set(synth, "frequency", bus).unwrap();
        assert_eq!(moment.get(synth, "frequency").unwrap(), Some(ControlValue::Bus(bus)));
        assert_eq!(
            moment.get(synth, "out").unwrap().and_then(|v| v.as_bus()),
            group.bus(0)
        );
    }

    #[test]
    fn test_move_breaking_later_history_is_rejected() {
        let mut session = Session::default();
        let (a, b) = {
            let mut moment = session.at(0.0).unwrap();
            let a = moment.add_group(NodeId::ROOT, GroupOptions::new()).unwrap();
            let b = moment.add_group(NodeId::ROOT, GroupOptions::new()).unwrap();
            (a, b)
        };
        {
            let mut moment = session.at(2.0).unwrap();
            moment.move_node(b, a, AddAction::AddToHead).unwrap();
        }
        let mut moment = session.at(1.0).unwrap();
        assert!(matches!(
            moment.move_node(a, b, AddAction::AddToHead),
            Err(SessionError::Cycle { .. })
        ));
        assert!(moment.state(1.0).unwrap().actions().is_empty());
        drop(moment);
        assert_eq!(session.graph_at(2.0).unwrap().parent(a), Some(b));
    }

    #[test]
    fn test_late_insert_invalidates_later_states() {
        let mut session = Session::default();
        {
            let mut moment = session.at(2.0).unwrap();
            moment.add_group(NodeId::ROOT, GroupOptions::new()).unwrap();
        }
        assert_eq!(session.graph_at(2.0).unwrap().len(), 2);

        let early = {
            let mut moment = session.at(1.0).unwrap();
            moment.add_group(NodeId::ROOT, GroupOptions::new()).unwrap()
        };
        assert!(!session.state(2.0).unwrap().is_dense());
        let graph = session.graph_at(2.0).unwrap();
        assert_eq!(graph.len(), 3);
        assert!(graph.contains(early));
    }
}
