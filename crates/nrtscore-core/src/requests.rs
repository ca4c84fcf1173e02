//! Engine commands emitted by the renderer.
//!
//! A [`Request`] is one scsynth command. It can be rendered as a plain
//! positional list (command name first) or as an OSC message.

use crate::bus::ControlValue;
use nrtscore_dsp::SynthDef;
use rosc::{OscMessage, OscPacket, OscType};
use serde_json::{json, Value};
use std::sync::Arc;

/// Action for adding nodes to the node tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddAction {
    /// Add to head of target group (first to execute).
    #[default]
    AddToHead = 0,
    /// Add to tail of target group (last to execute).
    AddToTail = 1,
    /// Add immediately before target node.
    AddBefore = 2,
    /// Add immediately after target node.
    AddAfter = 3,
}

impl AddAction {
    /// Whether the target is the new parent (rather than a sibling).
    pub fn targets_group(self) -> bool {
        matches!(self, AddAction::AddToHead | AddAction::AddToTail)
    }
}

impl From<AddAction> for i32 {
    fn from(action: AddAction) -> Self {
        action as i32
    }
}

/// Control name/value pairs in a creation or set command.
///
/// Bus-mapped values render as `a<index>` / `c<index>` symbols.
pub type Controls = Vec<(String, ControlValue)>;

/// One command for the external engine. Node ids are server ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `/d_recv`: upload a compiled definition.
    SynthDefReceive { synthdef: Arc<SynthDef> },
    /// `/g_new`: create a group.
    GroupNew {
        node_id: i32,
        add_action: AddAction,
        target: i32,
    },
    /// `/s_new`: create a synth with initial controls.
    SynthNew {
        synthdef: String,
        node_id: i32,
        add_action: AddAction,
        target: i32,
        controls: Controls,
    },
    /// `/n_set`: set controls on a synth, or on every synth in a group.
    NodeSet { node_id: i32, controls: Controls },
    /// `/n_free`: free nodes (groups free their children).
    NodeFree { node_ids: Vec<i32> },
    /// `/g_head`: move a node to the head of a group.
    GroupHead { group: i32, node: i32 },
    /// `/n_after`: move a node after another.
    NodeAfter { node: i32, target: i32 },
    /// No-op marking the end of a non-realtime score.
    Nothing,
}

impl Request {
    /// The OSC address of this command.
    pub fn address(&self) -> &'static str {
        match self {
            Request::SynthDefReceive { .. } => "/d_recv",
            Request::GroupNew { .. } => "/g_new",
            Request::SynthNew { .. } => "/s_new",
            Request::NodeSet { .. } => "/n_set",
            Request::NodeFree { .. } => "/n_free",
            Request::GroupHead { .. } => "/g_head",
            Request::NodeAfter { .. } => "/n_after",
            Request::Nothing => "/none",
        }
    }

    /// Positional arguments following the address.
    pub fn args(&self) -> Vec<OscType> {
        match self {
            Request::SynthDefReceive { synthdef } => {
                vec![OscType::Blob(synthdef.bytes().to_vec())]
            }
            Request::GroupNew {
                node_id,
                add_action,
                target,
            } => vec![
                OscType::Int(*node_id),
                OscType::Int((*add_action).into()),
                OscType::Int(*target),
            ],
            Request::SynthNew {
                synthdef,
                node_id,
                add_action,
                target,
                controls,
            } => {
                let mut args = vec![
                    OscType::String(synthdef.clone()),
                    OscType::Int(*node_id),
                    OscType::Int((*add_action).into()),
                    OscType::Int(*target),
                ];
                push_controls(&mut args, controls);
                args
            }
            Request::NodeSet { node_id, controls } => {
                let mut args = vec![OscType::Int(*node_id)];
                push_controls(&mut args, controls);
                args
            }
            Request::NodeFree { node_ids } => node_ids.iter().map(|id| OscType::Int(*id)).collect(),
            Request::GroupHead { group, node } => vec![OscType::Int(*group), OscType::Int(*node)],
            Request::NodeAfter { node, target } => {
                vec![OscType::Int(*node), OscType::Int(*target)]
            }
            Request::Nothing => Vec::new(),
        }
    }

    /// Render as an OSC message packet.
    pub fn to_osc(&self) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: self.address().to_string(),
            args: self.args(),
        })
    }

    /// Render as a plain list: command name followed by its arguments.
    ///
    /// The terminal marker renders as `[0]`, the numeric `/none` command.
    pub fn to_list(&self) -> Vec<Value> {
        if let Request::Nothing = self {
            return vec![json!(0)];
        }
        std::iter::once(json!(self.address()))
            .chain(self.args().iter().map(osc_to_value))
            .collect()
    }
}

fn push_controls(args: &mut Vec<OscType>, controls: &[(String, ControlValue)]) {
    for (name, value) in controls {
        args.push(OscType::String(name.clone()));
        args.push(match value {
            ControlValue::Number(value) => OscType::Float(*value),
            ControlValue::Bus(bus) => OscType::String(bus.map_symbol()),
        });
    }
}

fn osc_to_value(arg: &OscType) -> Value {
    match arg {
        OscType::Int(i) => json!(i),
        OscType::Float(f) => json!(f),
        OscType::String(s) => json!(s),
        OscType::Blob(bytes) => json!(bytes),
        other => json!(format!("{:?}", other)),
    }
}
