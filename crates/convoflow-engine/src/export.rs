//! Render a call flow as Graphviz DOT for visualization.
//!
//! The output is also valid call-flow source: parsing it back yields the
//! same nodes, texts, transitions and start node.

use convoflow_dot::escape;

use crate::graph::CallFlowGraph;

fn quoted(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

fn node_shape(graph: &CallFlowGraph, id: &str, terminal: bool) -> &'static str {
    if id == graph.start_node() {
        "Mdiamond"
    } else if terminal {
        "doublecircle"
    } else {
        "box"
    }
}

pub fn export_dot(graph: &CallFlowGraph) -> String {
    let mut out = format!("digraph {} {{\n", quoted(&graph.name));
    out.push_str(&format!(
        "    graph [start={}, rankdir=\"LR\"];\n",
        quoted(graph.start_node())
    ));

    for node in graph.all_nodes() {
        let mut attrs = vec![format!(
            "shape={}",
            quoted(node_shape(graph, &node.id, node.is_terminal()))
        )];
        if let Some(text) = &node.text {
            attrs.push(format!("text={}", quoted(text)));
            attrs.push(format!("tooltip={}", quoted(text)));
        }
        out.push_str(&format!("    {} [{}];\n", quoted(&node.id), attrs.join(", ")));
    }

    for (from, keyword, to) in graph.transitions() {
        out.push_str(&format!(
            "    {} -> {} [keyword={}, label={}];\n",
            quoted(from),
            quoted(to),
            quoted(keyword),
            quoted(keyword)
        ));
    }

    out.push_str("}\n");
    out
}
