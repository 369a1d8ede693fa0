//! Graph writers: Graphviz dot and JSON.
//!
//! Writers consume the exported [`CallGraph`] only; they never reach back
//! into the analyzer. Dot output draws defines edges dashed and uses edges
//! solid; vertices carrying a hue (from `color_by_file`) are filled with an
//! HSV color of fixed saturation and value.

use std::collections::HashMap;
use std::fmt::Write as _;

use callmap_core::graph::CallGraph;

/// Render the graph as Graphviz dot.
///
/// `annotate` appends `file:line` to each vertex label.
pub fn to_dot(graph: &CallGraph, annotate: bool) -> String {
    let mut out = String::new();
    out.push_str("digraph callmap {\n");
    out.push_str("    graph [rankdir=LR];\n");
    out.push_str("    node [shape=box, style=rounded];\n");

    // Qualified name -> stable dot identifier.
    let mut ids: HashMap<String, String> = HashMap::new();
    for node in &graph.nodes {
        let qualified = node.qualified_name();
        let id = dot_id(&qualified);
        let mut label = qualified.clone();
        if annotate {
            if let Some(loc) = &node.location {
                let _ = write!(label, "\\n{}:{}", loc.file, loc.line);
            }
        }
        let _ = write!(out, "    {id} [label=\"{}\"", escape(&label));
        if let Some(hue) = node.hue {
            let _ = write!(
                out,
                ", style=\"rounded,filled\", fillcolor=\"{hue:.3} 0.300 0.960\""
            );
        }
        out.push_str("];\n");
        ids.insert(qualified, id);
    }

    for edge in &graph.defines_edges {
        if let (Some(s), Some(t)) = (ids.get(&edge.source), ids.get(&edge.target)) {
            let _ = writeln!(out, "    {s} -> {t} [style=dashed, color=gray];");
        }
    }
    for edge in &graph.uses_edges {
        if let (Some(s), Some(t)) = (ids.get(&edge.source), ids.get(&edge.target)) {
            let _ = writeln!(out, "    {s} -> {t};");
        }
    }

    out.push_str("}\n");
    out
}

/// Render the graph as pretty-printed JSON.
pub fn to_json(graph: &CallGraph) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(graph)
}

/// A dot-safe identifier for a qualified name.
fn dot_id(qualified: &str) -> String {
    let mut id = String::with_capacity(qualified.len() + 2);
    id.push_str("n_");
    for ch in qualified.chars() {
        if ch.is_ascii_alphanumeric() {
            id.push(ch);
        } else {
            id.push_str("__");
        }
    }
    id
}

fn escape(label: &str) -> String {
    label.replace('"', "\\\"")
}

// ============================================================================
// Tests
// ============================================================================
