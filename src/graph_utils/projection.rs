use std::collections::{HashMap, HashSet};

use super::result_set::ResultSet;

/// Rows beyond this index never reach the graph view; tables still show everything.
pub const GRAPH_ROW_LIMIT: usize = 30;
/// Node ids are cut to this many characters.
pub const NODE_ID_MAX_CHARS: usize = 50;
/// Fill colors by column position, cycling past the fifth column.
pub const COLUMN_PALETTE: [&str; 5] = ["#1f77b4", "#2ca02c", "#ff7f0e", "#d62728", "#9467bd"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub color: &'static str,
    /// Position of the column the node was first seen in.
    pub column_index: usize,
}

pub type GraphEdge = (String, String);

/// Node/edge view of a result set. Nodes and edges keep first-insertion order so
/// the DOT text is stable for identical input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphDescription {
    nodes: Vec<GraphNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    edge_index: HashSet<GraphEdge>,
}

impl GraphDescription {
    pub fn nodes(&self) -> &[GraphNode] { &self.nodes }
    pub fn edges(&self) -> &[GraphEdge] { &self.edges }
    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn edge_count(&self) -> usize { self.edges.len() }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.edge_index.contains(&(source.to_string(), target.to_string()))
    }

    // First sighting wins: a repeated id keeps the label and color it was given.
    fn insert_node(&mut self, id: &str, column: &str, column_index: usize) {
        if self.node_index.contains_key(id) {
            return;
        }
        self.node_index.insert(id.to_string(), self.nodes.len());
        self.nodes.push(GraphNode {
            id: id.to_string(),
            label: format!("{}: {}", column, id),
            color: column_color(column_index),
            column_index,
        });
    }

    fn insert_edge(&mut self, source: &str, target: &str) {
        let edge = (source.to_string(), target.to_string());
        if self.edge_index.insert(edge.clone()) {
            self.edges.push(edge);
        }
    }

    /// Serialize as a left-to-right Graphviz digraph.
    pub fn to_dot(&self) -> String {
        let mut lines = vec![
            "digraph G {".to_string(),
            "    rankdir=LR;".to_string(),
            "    node [shape=box, style=filled, fontsize=10];".to_string(),
            "    edge [fontsize=9];".to_string(),
        ];
        for node in &self.nodes {
            lines.push(format!(
                "    {} [label={}, fillcolor=\"{}\", fontcolor=\"white\"];",
                dot_quoted(&node.id),
                dot_quoted(&node.label),
                node.color
            ));
        }
        for (source, target) in &self.edges {
            lines.push(format!("    {} -> {};", dot_quoted(source), dot_quoted(target)));
        }
        lines.push("}".to_string());
        lines.join("\n")
    }
}

pub fn column_color(column_index: usize) -> &'static str {
    COLUMN_PALETTE[column_index % COLUMN_PALETTE.len()]
}

/// Node identity for a cell's text: trimmed, quotes escaped, newlines flattened,
/// then cut to `NODE_ID_MAX_CHARS` characters.
pub fn node_id(text: &str) -> String {
    text.trim()
        .replace('"', "\\\"")
        .replace('\n', " ")
        .chars()
        .take(NODE_ID_MAX_CHARS)
        .collect()
}

/// Project the first `GRAPH_ROW_LIMIT` rows into a graph. Each non-blank cell is a
/// node; consecutive non-blank cells of one row are chained by directed edges.
///
/// Returns `None` when there is nothing to draw: no rows, fewer than two columns,
/// or no non-blank cell among the projected rows.
pub fn project(rows: &ResultSet) -> Option<GraphDescription> {
    if rows.is_empty() || rows.columns().len() < 2 {
        return None;
    }

    let mut graph = GraphDescription::default();
    for row in rows.rows().take(GRAPH_ROW_LIMIT) {
        let mut chain: Vec<String> = Vec::new();
        for (idx, (column, cell)) in row.iter().enumerate() {
            if cell.is_blank() {
                continue;
            }
            let id = node_id(&cell.to_string());
            graph.insert_node(&id, column, idx);
            chain.push(id);
        }
        for pair in chain.windows(2) {
            graph.insert_edge(&pair[0], &pair[1]);
        }
    }

    if graph.nodes.is_empty() { None } else { Some(graph) }
}

// DOT treats every `\"` as an escaped quote and a trailing backslash would swallow
// the closing quote.
fn dot_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    let mut prev: Option<char> = None;
    for ch in text.chars() {
        if ch == '"' && prev != Some('\\') {
            out.push('\\');
        }
        out.push(ch);
        prev = Some(ch);
    }
    if prev == Some('\\') {
        out.pop();
    }
    out.push('"');
    out
}
