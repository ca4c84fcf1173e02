//! Node parentage graph at one point in time.

use crate::error::{Result, SessionError};
use crate::node::NodeId;
use crate::requests::AddAction;
use crate::timing::AbsoluteOffset;
use std::collections::BTreeMap;

/// One structural mutation: place `source` relative to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAction {
    pub source: NodeId,
    pub target: NodeId,
    pub add_action: AddAction,
}

/// Parent and ordered-children maps rooted at [`NodeId::ROOT`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGraph {
    parents: BTreeMap<NodeId, Option<NodeId>>,
    children: BTreeMap<NodeId, Vec<NodeId>>,
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeGraph {
    /// A graph holding only the root group.
    pub fn new() -> Self {
        let mut parents = BTreeMap::new();
        parents.insert(NodeId::ROOT, None);
        let mut children = BTreeMap::new();
        children.insert(NodeId::ROOT, Vec::new());
        Self { parents, children }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.parents.contains_key(&node)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.parents.get(&node).copied().flatten()
    }

    /// Children of `node` in execution order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `[node, parent, grandparent, ..., root]`, or `None` if absent.
    pub fn parentage(&self, node: NodeId) -> Option<Vec<NodeId>> {
        if !self.contains(node) {
            return None;
        }
        let mut parentage = vec![node];
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            parentage.push(parent);
            current = parent;
        }
        Some(parentage)
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.parentage(node)
            .is_some_and(|parentage| parentage.contains(&ancestor))
    }

    /// Apply one action, unlinking `source` from its current parent first.
    ///
    /// `offset` only labels errors.
    pub fn apply(&mut self, action: &NodeAction, offset: AbsoluteOffset) -> Result<()> {
        let NodeAction {
            source,
            target,
            add_action,
        } = *action;
        if source.is_root() || self.is_ancestor(source, target) {
            return Err(SessionError::Cycle {
                node: source,
                target,
                offset: offset.as_f64(),
            });
        }
        let parent = if add_action.targets_group() {
            target
        } else {
            self.parent(target).ok_or(SessionError::InvalidTarget {
                target,
                add_action,
            })?
        };
        if !self.children.contains_key(&parent) {
            return Err(SessionError::InvalidTarget { target, add_action });
        }

        self.unlink(source);
        let siblings = self.children.entry(parent).or_default();
        let index = match add_action {
            AddAction::AddToHead => 0,
            AddAction::AddToTail => siblings.len(),
            AddAction::AddBefore | AddAction::AddAfter => {
                let position = siblings
                    .iter()
                    .position(|&n| n == target)
                    .ok_or(SessionError::InvalidTarget { target, add_action })?;
                if add_action == AddAction::AddAfter {
                    position + 1
                } else {
                    position
                }
            }
        };
        siblings.insert(index, source);
        self.parents.insert(source, Some(parent));
        Ok(())
    }

    /// Register `node` as able to hold children.
    pub(crate) fn mark_group(&mut self, node: NodeId) {
        self.children.entry(node).or_default();
    }

    /// Remove `node` and its whole subtree.
    pub fn remove_subtree(&mut self, node: NodeId) {
        if node.is_root() || !self.contains(node) {
            return;
        }
        self.unlink(node);
        let mut pending = vec![node];
        while let Some(current) = pending.pop() {
            self.parents.remove(&current);
            if let Some(children) = self.children.remove(&current) {
                pending.extend(children);
            }
        }
    }

    /// All nodes except the root in depth-first, execution order.
    pub fn walk(&self) -> Vec<NodeId> {
        self.descendants(NodeId::ROOT)
    }

    /// Every node below `node`, depth first.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut pending: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(current) = pending.pop() {
            order.push(current);
            pending.extend(self.children(current).iter().rev());
        }
        order
    }

    /// Where `node` sits, as an add action against an existing node:
    /// head of its parent when first, otherwise after its previous sibling.
    pub fn position(&self, node: NodeId) -> Option<(AddAction, NodeId)> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|&n| n == node)?;
        Some(match index {
            0 => (AddAction::AddToHead, parent),
            _ => (AddAction::AddAfter, siblings[index - 1]),
        })
    }

    fn unlink(&mut self, node: NodeId) {
        if let Some(parent) = self.parent(node) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|&n| n != node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AT: AbsoluteOffset = AbsoluteOffset::ZERO;

    fn action(source: usize, target: usize, add_action: AddAction) -> NodeAction {
        NodeAction {
            source: NodeId(source),
            target: NodeId(target),
            add_action,
        }
    }

    fn sample() -> NodeGraph {
        // root -> [1 -> [3], 2]
        let mut graph = NodeGraph::new();
        graph.mark_group(NodeId(1));
        graph.apply(&action(1, 0, AddAction::AddToHead), AT).unwrap();
        graph.apply(&action(2, 0, AddAction::AddToTail), AT).unwrap();
        graph.apply(&action(3, 1, AddAction::AddToHead), AT).unwrap();
        graph
    }

    #[test]
    fn test_add_actions() {
        let mut graph = sample();
        graph.apply(&action(4, 2, AddAction::AddBefore), AT).unwrap();
        graph.apply(&action(5, 2, AddAction::AddAfter), AT).unwrap();
        assert_eq!(
            graph.children(NodeId::ROOT),
            &[NodeId(1), NodeId(4), NodeId(2), NodeId(5)]
        );
        assert_eq!(
            graph.walk(),
            vec![NodeId(1), NodeId(3), NodeId(4), NodeId(2), NodeId(5)]
        );
    }

    #[test]
    fn test_move_relinks() {
        let mut graph = sample();
        graph.apply(&action(2, 1, AddAction::AddToTail), AT).unwrap();
        assert_eq!(graph.children(NodeId::ROOT), &[NodeId(1)]);
        assert_eq!(graph.children(NodeId(1)), &[NodeId(3), NodeId(2)]);
        assert_eq!(graph.parentage(NodeId(2)).unwrap(), vec![NodeId(2), NodeId(1), NodeId::ROOT]);
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut graph = NodeGraph::new();
        graph.mark_group(NodeId(1));
        graph.mark_group(NodeId(2));
        graph.apply(&action(1, 0, AddAction::AddToHead), AT).unwrap();
        graph.apply(&action(2, 1, AddAction::AddToHead), AT).unwrap();
        let before = graph.clone();
        assert!(graph.apply(&action(1, 2, AddAction::AddToHead), AT).is_err());
        assert_eq!(graph, before);
    }

    #[test]
    fn test_root_cannot_have_siblings() {
        let mut graph = NodeGraph::new();
        assert!(matches!(
            graph.apply(&action(1, 0, AddAction::AddAfter), AT),
            Err(SessionError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_synths_cannot_hold_children() {
        let mut graph = sample();
        assert!(graph.apply(&action(4, 2, AddAction::AddToHead), AT).is_err());
    }

    #[test]
    fn test_remove_subtree() {
        let mut graph = sample();
        graph.remove_subtree(NodeId(1));
        assert!(!graph.contains(NodeId(1)));
        assert!(!graph.contains(NodeId(3)));
        assert_eq!(graph.children(NodeId::ROOT), &[NodeId(2)]);
    }

    #[test]
    fn test_descendants() {
        let graph = sample();
        assert_eq!(graph.descendants(NodeId(1)), vec![NodeId(3)]);
        assert!(graph.descendants(NodeId(2)).is_empty());
        assert_eq!(graph.descendants(NodeId::ROOT), graph.walk());
    }

    #[test]
    fn test_position() {
        let graph = sample();
        assert_eq!(graph.position(NodeId(1)), Some((AddAction::AddToHead, NodeId::ROOT)));
        assert_eq!(graph.position(NodeId(2)), Some((AddAction::AddAfter, NodeId(1))));
        assert_eq!(graph.position(NodeId(3)), Some((AddAction::AddToHead, NodeId(1))));
        assert_eq!(graph.position(NodeId::ROOT), None);
    }
}
