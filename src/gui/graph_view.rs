use std::collections::HashMap;

use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke, Vec2};

use crate::graph_utils::layout::{graphviz_name, GraphLayout, GraphRenderer};
use crate::graph_utils::projection::{project, GraphDescription, GraphNode};
use crate::graph_utils::result_set::ResultSet;

/// What the graph view of one turn shows. Built once per turn and cached, since the
/// layout shells out to Graphviz.
#[derive(Clone, Debug)]
pub enum GraphRender {
    /// Nothing to draw; the message says why.
    Nothing(String),
    Drawn { graph: GraphDescription, layout: GraphLayout, dot: String },
    /// Layout failed; the DOT source is shown instead.
    Failed { error: String, dot: String },
}

impl GraphRender {
    pub fn build(rows: &ResultSet, renderer: &dyn GraphRenderer) -> Self {
        let Some(graph) = project(rows) else {
            let why = if rows.columns().len() < 2 {
                "Need at least 2 columns to show relationships."
            } else {
                "No data to visualise."
            };
            return GraphRender::Nothing(why.to_string());
        };
        let dot = graph.to_dot();
        match renderer.layout(&dot) {
            Ok(layout) => GraphRender::Drawn { graph, layout, dot },
            Err(e) => {
                log::warn!("{}", e);
                GraphRender::Failed { error: e.to_string(), dot }
            }
        }
    }

    pub fn dot(&self) -> Option<&str> {
        match self {
            GraphRender::Nothing(_) => None,
            GraphRender::Drawn { dot, .. } | GraphRender::Failed { dot, .. } => Some(dot.as_str()),
        }
    }
}

pub fn show(ui: &mut egui::Ui, render: &GraphRender, salt: impl std::hash::Hash) {
    match render {
        GraphRender::Nothing(msg) => {
            ui.label(msg);
        }
        GraphRender::Drawn { graph, layout, .. } => {
            ui.small(format!("{} node(s), {} edge(s)", graph.node_count(), graph.edge_count()));
            paint_layout(ui, graph, layout);
        }
        GraphRender::Failed { error, .. } => {
            ui.colored_label(Color32::RED, error);
        }
    }
    if let Some(dot) = render.dot() {
        let failed = matches!(render, GraphRender::Failed { .. });
        egui::CollapsingHeader::new("DOT Source")
            .id_salt(salt)
            .default_open(failed)
            .show(ui, |ui| {
                ui.code(dot);
            });
    }
}

fn paint_layout(ui: &mut egui::Ui, graph: &GraphDescription, layout: &GraphLayout) {
    let pad = 12.0;
    let avail = ui.available_width().max(200.0);
    let scale = if layout.width > 0.0 { ((avail - 2.0 * pad) / layout.width).clamp(24.0, 72.0) } else { 72.0 };
    let size = Vec2::new(layout.width * scale + 2.0 * pad, layout.height * scale + 2.0 * pad);

    let (resp, painter) = ui.allocate_painter(size, Sense::hover());
    let origin = resp.rect.min;
    let to_screen = |x: f32, y: f32| Pos2::new(origin.x + pad + x * scale, origin.y + pad + (layout.height - y) * scale);

    let by_name: HashMap<String, &GraphNode> = graph.nodes().iter().map(|n| (graphviz_name(&n.id), n)).collect();

    let edge_stroke = Stroke::new(1.2, Color32::from_gray(150));
    for edge in &layout.edges {
        let pts: Vec<Pos2> = edge.points.iter().map(|&(x, y)| to_screen(x, y)).collect();
        for w in pts.windows(2) {
            painter.line_segment([w[0], w[1]], edge_stroke);
        }
        if let [.., prev, last] = pts.as_slice() {
            let dir = (*last - *prev).normalized();
            if dir.x.is_finite() && dir.y.is_finite() {
                painter.arrow(*last, dir * 8.0, edge_stroke);
            }
        }
    }

    let font = egui::FontId::proportional((10.0 * scale / 72.0 * 1.4).clamp(9.0, 13.0));
    let mut hovered: Option<&GraphNode> = None;
    for node in &layout.nodes {
        let rect = Rect::from_center_size(to_screen(node.x, node.y), Vec2::new(node.width * scale, node.height * scale));
        let info = by_name.get(&node.name).copied();
        let fill = info.map(|n| hex_color(n.color)).unwrap_or(Color32::from_gray(0x88));
        painter.rect_filled(rect, 3.0, fill);
        let text = info.map(|n| n.label.as_str()).unwrap_or(node.name.as_str());
        painter.text(rect.center(), egui::Align2::CENTER_CENTER, text, font.clone(), Color32::WHITE);
        if resp.hover_pos().map(|p| rect.contains(p)).unwrap_or(false) {
            hovered = info;
        }
    }

    if let Some(n) = hovered {
        resp.on_hover_text(format!("{}\ncolumn #{}", n.label, n.column_index + 1));
    }
}

/// `#rrggbb` to a color; anything else falls back to gray.
pub fn hex_color(hex: &str) -> Color32 {
    let h = hex.trim_start_matches('#');
    if h.len() != 6 {
        return Color32::from_gray(0x88);
    }
    let part = |i: usize| u8::from_str_radix(&h[i..i + 2], 16).ok();
    match (part(0), part(2), part(4)) {
        (Some(r), Some(g), Some(b)) => Color32::from_rgb(r, g, b),
        _ => Color32::from_gray(0x88),
    }
}
