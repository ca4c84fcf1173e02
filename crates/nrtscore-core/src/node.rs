//! Groups and synths placed on a session timeline.
//!
//! A [`Node`] knows its extent on the timeline and the event history of each
//! of its attributes. Structure (parents and children) lives in the
//! per-offset [`State`](crate::state::State)s, not on the node.

use crate::bus::ControlValue;
use crate::events::EventStore;
use crate::requests::AddAction;
use crate::timing::{AbsoluteOffset, RelativeOffset};
use nrtscore_dsp::SynthDef;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// First server node id handed to session nodes.
const SERVER_ID_BASE: i32 = 999;

/// Session-scoped node handle.
///
/// Id 0 is the session's root group; created nodes count up from 1 in
/// creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The session's root group.
    pub const ROOT: NodeId = NodeId(0);

    pub fn is_root(self) -> bool {
        self.0 == 0
    }

    /// The node id used on the server: 0 for the root, `999 + n` otherwise.
    pub fn server_id(self) -> i32 {
        if self.is_root() {
            0
        } else {
            SERVER_ID_BASE + self.0 as i32
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What kind of node this is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// The implicit root group every session owns.
    Root,
    Group,
    Synth {
        synthdef: Arc<SynthDef>,
        /// Controls given at creation; they override the definition defaults.
        settings: BTreeMap<String, ControlValue>,
    },
}

/// A group or synth with a timeline extent and per-attribute events.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    start_offset: AbsoluteOffset,
    duration: f64,
    events: BTreeMap<String, EventStore>,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self {
            id: NodeId::ROOT,
            kind: NodeKind::Root,
            start_offset: AbsoluteOffset::ZERO,
            duration: f64::INFINITY,
            events: BTreeMap::new(),
        }
    }

    pub(crate) fn new(
        id: NodeId,
        kind: NodeKind,
        start_offset: AbsoluteOffset,
        duration: f64,
    ) -> Self {
        let mut node = Self {
            id,
            kind,
            start_offset,
            duration,
            events: BTreeMap::new(),
        };
        if let NodeKind::Synth { settings, .. } = &node.kind {
            for (name, value) in settings.clone() {
                node.set_at(RelativeOffset::ZERO, &name, value);
            }
        }
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether the node can hold children.
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Root | NodeKind::Group)
    }

    pub fn synthdef(&self) -> Option<&Arc<SynthDef>> {
        match &self.kind {
            NodeKind::Synth { synthdef, .. } => Some(synthdef),
            _ => None,
        }
    }

    pub fn start_offset(&self) -> AbsoluteOffset {
        self.start_offset
    }

    /// Lifetime in seconds; `f64::INFINITY` for nodes that never stop.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn stop_offset(&self) -> AbsoluteOffset {
        self.start_offset.advance(self.duration)
    }

    /// Node-relative position of a session offset.
    ///
    /// The stop offset maps to exactly `duration`, however `start + duration`
    /// rounded.
    pub fn relative_offset(&self, offset: AbsoluteOffset) -> RelativeOffset {
        if self.duration.is_finite() && offset == self.stop_offset() {
            RelativeOffset::new(self.duration)
        } else {
            offset.relative_to(self.start_offset)
        }
    }

    /// Whether this is a synth released through its `gate` control.
    pub fn is_gated(&self) -> bool {
        self.duration.is_finite() && self.synthdef().is_some_and(|s| s.has_gate())
    }

    /// Whether `name` is a settable attribute of this node.
    ///
    /// Synths accept their definition's controls; groups forward settings
    /// to their children and accept any name.
    pub fn accepts(&self, name: &str) -> bool {
        match &self.kind {
            NodeKind::Synth { synthdef, .. } => synthdef.parameter(name).is_some(),
            NodeKind::Group => true,
            NodeKind::Root => false,
        }
    }

    /// Value of `name` before any event: creation setting, then definition default.
    pub fn default_value(&self, name: &str) -> Option<ControlValue> {
        match &self.kind {
            NodeKind::Synth { synthdef, settings } => settings
                .get(name)
                .copied()
                .or_else(|| synthdef.parameter(name).map(ControlValue::Number)),
            _ => None,
        }
    }

    /// Event history of one attribute.
    pub fn events(&self, name: &str) -> Option<&EventStore> {
        self.events.get(name)
    }

    /// Value of `name` at a node-relative offset.
    pub fn get_at(&self, offset: RelativeOffset, name: &str) -> Option<ControlValue> {
        let default = self.default_value(name);
        match self.events.get(name) {
            Some(store) => store.get(offset, default),
            None => default,
        }
    }

    /// Record `value` for `name` at a node-relative offset.
    ///
    /// Returns `false` when the offset lies outside the node's lifetime.
    pub(crate) fn set_at(&mut self, offset: RelativeOffset, name: &str, value: ControlValue) -> bool {
        if !(0.0..=self.duration).contains(&offset.as_f64()) {
            log::trace!(
                "[EVENTS] Ignoring {} at {} outside lifetime {}",
                name,
                offset,
                self.duration
            );
            return false;
        }
        let duration = self.duration;
        self.events
            .entry(name.to_string())
            .or_default()
            .set(offset, value, duration)
    }

    /// Settings to send at a node-relative offset.
    ///
    /// Persistent collection reports the value in effect for every attribute
    /// with history; otherwise only attributes with an event exactly at
    /// `offset` are reported.
    pub fn collect_settings(
        &self,
        offset: RelativeOffset,
        persistent: bool,
    ) -> Vec<(String, ControlValue)> {
        self.events
            .iter()
            .filter_map(|(name, store)| {
                let value = if persistent {
                    store.get(offset, self.default_value(name))
                } else {
                    store.at(offset)
                };
                value.map(|v| (name.clone(), v))
            })
            .collect()
    }
}

/// Placement and lifetime for a new group.
#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    pub add_action: AddAction,
    /// `None` means the group never stops.
    pub duration: Option<f64>,
}

impl GroupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(mut self, add_action: AddAction) -> Self {
        self.add_action = add_action;
        self
    }

    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Definition, placement, lifetime and initial controls for a new synth.
#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub synthdef: Arc<SynthDef>,
    pub add_action: AddAction,
    /// `None` means the synth never stops.
    pub duration: Option<f64>,
    pub controls: BTreeMap<String, ControlValue>,
}

impl SynthOptions {
    pub fn new(synthdef: Arc<SynthDef>) -> Self {
        Self {
            synthdef,
            add_action: AddAction::default(),
            duration: None,
            controls: BTreeMap::new(),
        }
    }

    pub fn add_action(mut self, add_action: AddAction) -> Self {
        self.add_action = add_action;
        self
    }

    pub fn duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set an initial control value or bus mapping.
    pub fn control(mut self, name: impl Into<String>, value: impl Into<ControlValue>) -> Self {
        self.controls.insert(name.into(), value.into());
        self
    }
}
