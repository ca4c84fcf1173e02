//! Turning a session into timestamped engine commands.
//!
//! States are replayed in offset order against a running node graph. At
//! each offset the renderer emits, in order:
//!
//! 1. `/d_recv` for definitions not uploaded yet
//! 2. `/g_new` and `/s_new` for starting nodes, `/g_head` and `/n_after`
//!    for moved ones, walking the tree depth first
//! 3. `/n_set` for attributes with an event exactly here
//! 4. implicit `gate = 0` for gated synths reaching their stop
//! 5. one `/n_free` for everything else that stops
//!
//! Nodes that start and stop at the same offset are freed right away,
//! unless they sit below a group with a finite lifetime that frees them
//! later.
//!
//! A final no-op marks the end of the score.

use crate::bus::ControlValue;
use crate::error::{Result, SessionError};
use crate::node::{Node, NodeId, NodeKind};
use crate::requests::{AddAction, Request};
use crate::score::Score;
use crate::session::{leave, Session};
use crate::state::{NodeGraph, State};
use crate::timing::{AbsoluteOffset, RelativeOffset};
use nrtscore_dsp::{SynthDef, GATE};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Requests grouped per offset, in offset order.
pub type Timeline = Vec<(AbsoluteOffset, Vec<Request>)>;

impl Session {
    /// Render every offset up to and including `duration`.
    ///
    /// Offsets with nothing to send are skipped. The last group, at
    /// `duration`, ends with [`Request::Nothing`].
    pub fn to_requests(&self, duration: f64) -> Result<Timeline> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(SessionError::InvalidDuration(duration));
        }
        let end = AbsoluteOffset::new(duration);

        let mut uploaded: HashSet<Arc<SynthDef>> = HashSet::new();
        let mut graph = NodeGraph::new();
        let mut previous: Option<&State> = None;
        let mut timeline = Timeline::new();

        for state in self.states().range(..=end).map(|(_, s)| s) {
            if let Some(previous) = previous {
                leave(&mut graph, previous);
            }
            let before = graph.clone();
            self.enter(&mut graph, state)?;
            previous = Some(state);

            let requests = self.render_state(state, &before, &graph, &mut uploaded)?;
            if !requests.is_empty() {
                log::trace!(
                    "[RENDER] {} requests at {}",
                    requests.len(),
                    state.offset()
                );
                timeline.push((state.offset(), requests));
            }
        }

        match timeline.last_mut() {
            Some((offset, requests)) if *offset == end => requests.push(Request::Nothing),
            _ => timeline.push((end, vec![Request::Nothing])),
        }
        log::debug!(
            "[RENDER] Rendered {} offsets up to {}s ({} definitions)",
            timeline.len(),
            duration,
            uploaded.len()
        );
        Ok(timeline)
    }

    /// Render as plain lists: `(seconds, [[command, args...], ...])`.
    pub fn to_lists(&self, duration: f64) -> Result<Vec<(f64, Vec<Vec<Value>>)>> {
        Ok(self
            .to_requests(duration)?
            .into_iter()
            .map(|(offset, requests)| {
                (
                    offset.as_f64(),
                    requests.iter().map(Request::to_list).collect(),
                )
            })
            .collect())
    }

    /// Render into a [`Score`] ready for export.
    pub fn to_score(&self, duration: f64) -> Result<Score> {
        Ok(Score::from_timeline(self.to_requests(duration)?))
    }

    /// Render straight to the non-realtime datagram stream.
    pub fn to_datagram(&self, duration: f64) -> Result<Vec<u8>> {
        self.to_score(duration)?.to_datagram()
    }

    fn render_state(
        &self,
        state: &State,
        before: &NodeGraph,
        after: &NodeGraph,
        uploaded: &mut HashSet<Arc<SynthDef>>,
    ) -> Result<Vec<Request>> {
        let offset = state.offset();
        let starting = state.start_nodes();
        let moved: BTreeSet<NodeId> = state
            .actions()
            .iter()
            .map(|action| action.source)
            .filter(|node| !starting.contains(node))
            .collect();
        let order = after.walk();

        let mut requests = Vec::new();

        for &id in order.iter().filter(|id| starting.contains(id)) {
            if let Some(synthdef) = self.node(id)?.synthdef() {
                if uploaded.insert(Arc::clone(synthdef)) {
                    requests.push(Request::SynthDefReceive {
                        synthdef: Arc::clone(synthdef),
                    });
                }
            }
        }

        for &id in &order {
            let is_new = starting.contains(&id);
            if !is_new && !moved.contains(&id) {
                continue;
            }
            let (add_action, target) = after.position(id).ok_or(SessionError::NodeNotPresent {
                node: id,
                offset: offset.as_f64(),
            })?;
            let node = self.node(id)?;
            requests.push(if is_new {
                creation(node, add_action, target)
            } else {
                placement(id, add_action, target)
            });
        }

        // Nodes stopping here left `after`; they may still take a last event.
        let stopping: Vec<NodeId> = before
            .walk()
            .into_iter()
            .filter(|id| state.stop_nodes().contains(id) && !after.contains(*id))
            .collect();
        for &id in order.iter().chain(&stopping) {
            let node = self.node(id)?;
            if starting.contains(&id) && !node.is_group() {
                continue;
            }
            let controls = node.collect_settings(node.relative_offset(offset), false);
            if !controls.is_empty() {
                requests.push(Request::NodeSet {
                    node_id: id.server_id(),
                    controls,
                });
            }
        }

        let instant: BTreeSet<NodeId> = starting
            .intersection(state.stop_nodes())
            .copied()
            .filter(|&id| after.contains(id))
            .collect();
        let mut freed: BTreeSet<NodeId> = stopping
            .iter()
            .copied()
            .filter(|&id| self.node(id).is_ok_and(|node| !node.is_gated()))
            .collect();
        for &id in &instant {
            if !self.node(id)?.is_gated() && !self.freed_later(id, after, &instant) {
                freed.insert(id);
            }
        }
        let under_freed = |id: NodeId, graph: &NodeGraph| {
            graph
                .parentage(id)
                .is_some_and(|chain| chain.iter().skip(1).any(|n| freed.contains(n)))
        };

        for &id in state.stop_nodes() {
            let node = self.node(id)?;
            if !node.is_gated() {
                continue;
            }
            let graph = if instant.contains(&id) { after } else { before };
            if !graph.contains(id) || under_freed(id, graph) || has_explicit_gate(node) {
                continue;
            }
            requests.push(Request::NodeSet {
                node_id: id.server_id(),
                controls: vec![(GATE.to_string(), ControlValue::Number(0.0))],
            });
        }

        let mut node_ids: Vec<i32> = freed
            .iter()
            .filter(|&&id| !under_freed(id, if instant.contains(&id) { after } else { before }))
            .map(|id| id.server_id())
            .collect();
        if !node_ids.is_empty() {
            node_ids.sort_unstable();
            requests.push(Request::NodeFree { node_ids });
        }

        Ok(requests)
    }

    /// Whether a group with a finite lifetime above `id` frees it later.
    ///
    /// Only holds when everything below `id` ends here as well.
    fn freed_later(&self, id: NodeId, graph: &NodeGraph, instant: &BTreeSet<NodeId>) -> bool {
        let covered = graph.parentage(id).is_some_and(|chain| {
            chain.iter().skip(1).any(|&ancestor| {
                !ancestor.is_root()
                    && self
                        .node(ancestor)
                        .is_ok_and(|node| node.duration().is_finite())
            })
        });
        covered && graph.descendants(id).iter().all(|node| instant.contains(node))
    }
}

fn creation(node: &Node, add_action: AddAction, target: NodeId) -> Request {
    match node.kind() {
        NodeKind::Synth { synthdef, .. } => Request::SynthNew {
            synthdef: synthdef.name().to_string(),
            node_id: node.id().server_id(),
            add_action,
            target: target.server_id(),
            controls: node.collect_settings(RelativeOffset::ZERO, true),
        },
        NodeKind::Group | NodeKind::Root => Request::GroupNew {
            node_id: node.id().server_id(),
            add_action,
            target: target.server_id(),
        },
    }
}

fn placement(id: NodeId, add_action: AddAction, target: NodeId) -> Request {
    match add_action {
        AddAction::AddToHead => Request::GroupHead {
            group: target.server_id(),
            node: id.server_id(),
        },
        _ => Request::NodeAfter {
            node: id.server_id(),
            target: target.server_id(),
        },
    }
}

/// Whether the caller already set `gate` at the synth's stop.
fn has_explicit_gate(node: &Node) -> bool {
    node.events(GATE)
        .and_then(|store| store.at(node.relative_offset(node.stop_offset())))
        .is_some()
}
