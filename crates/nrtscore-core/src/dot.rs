//! Graphviz rendering of the node tree at one offset.
//!
//! ```text
//! digraph G {
//!     node [shape=box, style=rounded];
//!     node_0 [label="Root:0"];
//!     node_1000 [label="G:1000\n0:4"];
//!     node_0 -> node_1000;
//! }
//! ```

use crate::error::Result;
use crate::node::{Node, NodeId, NodeKind};
use crate::session::Session;
use crate::timing::AbsoluteOffset;

/// Characters of a definition name shown in a synth label.
const NAME_PREFIX: usize = 7;

impl Session {
    /// DOT description of the node tree at `offset`.
    ///
    /// Children are listed in execution order. With `include_controls`,
    /// synths also show the control values in effect at `offset`.
    pub fn graph_dot(&mut self, offset: f64, include_controls: bool) -> Result<String> {
        let at = AbsoluteOffset::new(offset);
        let graph = self.graph_at(offset)?.clone();

        let mut out = String::from("digraph G {\n");
        out.push_str("    graph [rankdir=TB];\n");
        out.push_str("    node [shape=box, style=rounded];\n");
        out.push_str("    node_0 [label=\"Root:0\"];\n");
        for id in graph.walk() {
            let node = self.node(id)?;
            out.push_str(&format!(
                "    node_{} [label=\"{}\"];\n",
                id.server_id(),
                label(node, at, include_controls)
            ));
        }
        for parent in std::iter::once(NodeId::ROOT).chain(graph.walk()) {
            for child in graph.children(parent) {
                out.push_str(&format!(
                    "    node_{} -> node_{};\n",
                    parent.server_id(),
                    child.server_id()
                ));
            }
        }
        out.push_str("}\n");
        Ok(out)
    }
}

fn label(node: &Node, at: AbsoluteOffset, include_controls: bool) -> String {
    let extent = format!("{}:{}", node.start_offset(), node.stop_offset());
    match node.kind() {
        NodeKind::Synth { synthdef, .. } => {
            let name: String = synthdef.name().chars().take(NAME_PREFIX).collect();
            let mut text = format!("S:{}\\n({})\\n{}", node.id().server_id(), name, extent);
            if include_controls {
                let relative = node.relative_offset(at);
                for parameter in synthdef.parameters() {
                    if let Some(value) = node.get_at(relative, &parameter.name) {
                        text.push_str(&format!("\\n{}: {}", parameter.name, value));
                    }
                }
            }
            text
        }
        NodeKind::Group => format!("G:{}\\n{}", node.id().server_id(), extent),
        NodeKind::Root => "Root:0".to_string(),
    }
}
