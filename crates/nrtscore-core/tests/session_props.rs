use nrtscore_core::{
    dc_synthdef, AddAction, GroupOptions, NodeId, Session, SynthDef, SynthOptions,
};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Group { at: u8, target: usize, action: u8, duration: Option<u8> },
    Synth { at: u8, target: usize, action: u8, duration: Option<u8> },
    Move { at: u8, target: usize, node: usize, action: u8 },
}

fn add_action(index: u8) -> AddAction {
    match index % 4 {
        0 => AddAction::AddToHead,
        1 => AddAction::AddToTail,
        2 => AddAction::AddBefore,
        _ => AddAction::AddAfter,
    }
}

fn op() -> impl Strategy<Value = Op> {
    let duration = prop::option::of(1u8..6);
    prop_oneof![
        (0u8..6, 0usize..12, 0u8..4, duration.clone()).prop_map(|(at, target, action, duration)| {
            Op::Group { at, target, action, duration }
        }),
        (0u8..6, 0usize..12, 0u8..4, duration).prop_map(|(at, target, action, duration)| {
            Op::Synth { at, target, action, duration }
        }),
        (0u8..6, 0usize..12, 0usize..12, 0u8..4).prop_map(|(at, target, node, action)| {
            Op::Move { at, target, node, action }
        }),
    ]
}

/// Apply `op`, ignoring rejected operations.
fn apply(session: &mut Session, synthdef: &Arc<SynthDef>, op: &Op) {
    let mut moment = match op {
        Op::Group { at, .. } | Op::Synth { at, .. } | Op::Move { at, .. } => {
            session.at(*at as f64).unwrap()
        }
    };
    let count = moment.nodes().len();
    let _ = match *op {
        Op::Group { target, action, duration, .. } => {
            let mut options = GroupOptions::new().add_action(add_action(action));
            options.duration = duration.map(f64::from);
            moment.add_group(NodeId(target % count), options).map(|_| ())
        }
        Op::Synth { target, action, duration, .. } => {
            let mut options =
                SynthOptions::new(Arc::clone(synthdef)).add_action(add_action(action));
            options.duration = duration.map(f64::from);
            moment.add_synth(NodeId(target % count), options).map(|_| ())
        }
        Op::Move { target, node, action, .. } => {
            moment.move_node(NodeId(target % count), NodeId(node % count), add_action(action))
        }
    };
}

proptest! {
    #[test]
    fn prop_parentage_always_reaches_root(ops in prop::collection::vec(op(), 1..40)) {
        let synthdef = Arc::new(dc_synthdef().unwrap());
        let mut session = Session::default();
        for op in &ops {
            apply(&mut session, &synthdef, op);
        }

        let offsets: Vec<f64> = session.states().keys().map(|o| o.as_f64()).collect();
        for offset in offsets {
            let graph = session.graph_at(offset).unwrap();
            let walked = graph.walk();
            prop_assert_eq!(walked.len() + 1, graph.len());
            for node in walked {
                let parentage = graph.parentage(node).unwrap();
                prop_assert!(parentage.len() <= graph.len());
                prop_assert_eq!(parentage.last(), Some(&NodeId::ROOT));
            }
        }
    }

    #[test]
    fn prop_rendered_active_set_matches_lifetimes(
        specs in prop::collection::vec((0u8..8, 0u8..6, any::<bool>(), 0usize..8), 1..24),
    ) {
        let synthdef = Arc::new(dc_synthdef().unwrap());
        let mut session = Session::default();
        let mut placed: Vec<Placed> = Vec::new();
        for &(start, duration, is_group, parent) in &specs {
            let groups: Vec<usize> = (0..placed.len()).filter(|&i| placed[i].is_group).collect();
            let parent = match parent % (groups.len() + 1) {
                0 => None,
                n => Some(groups[n - 1]),
            };
            let target = parent.map_or(NodeId::ROOT, |i| placed[i].id);
            let mut moment = session.at(f64::from(start)).unwrap();
            let added = if is_group {
                moment.add_group(target, GroupOptions::new().duration(f64::from(duration)))
            } else {
                moment.add_synth(
                    target,
                    SynthOptions::new(Arc::clone(&synthdef)).duration(f64::from(duration)),
                )
            };
            drop(moment);
            if let Ok(id) = added {
                placed.push(Placed {
                    id,
                    start: f64::from(start),
                    duration: f64::from(duration),
                    is_group,
                    parent,
                });
            }
        }
        let lifetimes = lifetimes(&placed);

        let mut engine = Engine::default();
        for (time, commands) in session.to_lists(20.0).unwrap() {
            for command in &commands {
                engine.apply(command);
            }
            let expected: BTreeSet<i64> = placed
                .iter()
                .zip(&lifetimes)
                .filter(|(node, stop)| node.start <= time && time < **stop)
                .map(|(node, _)| i64::from(node.id.server_id()))
                .collect();
            prop_assert_eq!(engine.active(), expected);
        }
        prop_assert!(engine.active().is_empty());
    }
}

struct Placed {
    id: NodeId,
    start: f64,
    duration: f64,
    is_group: bool,
    parent: Option<usize>,
}

/// When each node actually leaves the engine.
///
/// Groups free everything below them. A zero-length node is left to a
/// finite ancestor when nothing below it outlives the offset it starts at.
fn lifetimes(placed: &[Placed]) -> Vec<f64> {
    let mut stops: Vec<f64> = Vec::with_capacity(placed.len());
    for (index, node) in placed.iter().enumerate() {
        let inherited = node.parent.map_or(f64::INFINITY, |p| stops[p]);
        let subtree_ends_here = placed
            .iter()
            .enumerate()
            .filter(|(other, _)| descends_from(placed, *other, index))
            .all(|(_, other)| other.duration == 0.0);
        stops.push(if node.duration == 0.0 && inherited.is_finite() && subtree_ends_here {
            inherited
        } else {
            (node.start + node.duration).min(inherited)
        });
    }
    stops
}

fn descends_from(placed: &[Placed], node: usize, ancestor: usize) -> bool {
    let mut current = placed[node].parent;
    while let Some(parent) = current {
        if parent == ancestor {
            return true;
        }
        current = placed[parent].parent;
    }
    false
}

/// Node tree as the engine sees it after replaying commands.
#[derive(Default)]
struct Engine {
    parents: BTreeMap<i64, i64>,
}

impl Engine {
    fn apply(&mut self, command: &[Value]) {
        let (id, add_action, target) = match command[0].as_str() {
            Some("/g_new") => (&command[1], &command[2], &command[3]),
            Some("/s_new") => (&command[2], &command[3], &command[4]),
            Some("/n_free") => {
                for id in command[1..].iter().filter_map(Value::as_i64) {
                    self.free(id);
                }
                return;
            }
            _ => return,
        };
        let (id, target) = (id.as_i64().unwrap(), target.as_i64().unwrap());
        let parent = match add_action.as_i64() {
            Some(0) | Some(1) => target,
            _ => self.parents[&target],
        };
        self.parents.insert(id, parent);
    }

    fn free(&mut self, id: i64) {
        let children: Vec<i64> = self
            .parents
            .iter()
            .filter(|(_, parent)| **parent == id)
            .map(|(child, _)| *child)
            .collect();
        for child in children {
            self.free(child);
        }
        self.parents.remove(&id);
    }

    fn active(&self) -> BTreeSet<i64> {
        self.parents.keys().copied().collect()
    }
}
