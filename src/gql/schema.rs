use anyhow::{anyhow, Result};

use crate::error::AppError;
use crate::graph_utils::result_set::{CellValue, ResultRow, ResultSet};
use super::store::GraphStore;

pub const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label ORDER BY label";
pub const RELATIONSHIP_TYPES_QUERY: &str =
    "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType ORDER BY relationshipType";
pub const NODE_COUNTS_QUERY: &str = "MATCH (n) RETURN labels(n)[0] AS label, count(*) AS count ORDER BY count DESC";
pub const SCHEMA_EDGES_QUERY: &str = "MATCH (n)-[r]->(m) \
     WITH labels(n)[0] AS FromNode, type(r) AS Relationship, labels(m)[0] AS ToNode \
     RETURN DISTINCT FromNode, Relationship, ToNode \
     ORDER BY FromNode, Relationship";
pub const NODE_PROPERTIES_QUERY: &str = "MATCH (n) WITH labels(n)[0] AS label, keys(n) AS props \
     UNWIND props AS prop \
     RETURN DISTINCT label, prop ORDER BY label, prop";

/// Label counts shown in the schema view: ten at most, five per row.
pub const NODE_COUNT_DISPLAY_LIMIT: usize = 10;
pub const NODE_COUNT_ROW_WIDTH: usize = 5;

// Nodes without any label come back as null from `labels(n)[0]`.
const NO_LABEL: &str = "(no label)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaEdge {
    pub from_label: String,
    pub relationship: String,
    pub to_label: String,
}

/// Results of the four schema reads. Each is kept separately so one failure does
/// not hide the others.
#[derive(Debug)]
pub struct SchemaSnapshot {
    pub labels: Result<Vec<String>, AppError>,
    pub relationship_types: Result<Vec<String>, AppError>,
    pub node_counts: Result<Vec<LabelCount>, AppError>,
    pub schema_edges: Result<Vec<SchemaEdge>, AppError>,
}

impl SchemaSnapshot {
    /// Top label counts split into display rows of `NODE_COUNT_ROW_WIDTH`.
    pub fn node_count_rows(&self) -> Vec<&[LabelCount]> {
        match &self.node_counts {
            Ok(counts) => {
                let shown = &counts[..counts.len().min(NODE_COUNT_DISPLAY_LIMIT)];
                shown.chunks(NODE_COUNT_ROW_WIDTH).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// `node_count_rows` as text, one line per display row.
    pub fn node_count_lines(&self) -> Vec<String> {
        self.node_count_rows()
            .into_iter()
            .map(|row| row.iter().map(|lc| format!("{}: {}", lc.label, lc.count)).collect::<Vec<_>>().join(" | "))
            .collect()
    }
}

/// Fixed introspection queries over a graph store. Ordering is left to the
/// queries themselves.
pub struct SchemaIntrospector<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    pub fn list_labels(&self) -> Result<Vec<String>, AppError> {
        self.read("Node labels", LABELS_QUERY, |row| text_column(row, "label"))
    }

    pub fn list_relationship_types(&self) -> Result<Vec<String>, AppError> {
        self.read("Relationship types", RELATIONSHIP_TYPES_QUERY, |row| text_column(row, "relationshipType"))
    }

    /// Count per first label, largest first. Multi-label nodes count once.
    pub fn count_nodes_by_label(&self) -> Result<Vec<LabelCount>, AppError> {
        self.read("Node counts", NODE_COUNTS_QUERY, |row| {
            Ok(LabelCount { label: label_column(row, "label")?, count: int_column(row, "count")? })
        })
    }

    pub fn list_schema_edges(&self) -> Result<Vec<SchemaEdge>, AppError> {
        self.read("Schema relationships", SCHEMA_EDGES_QUERY, |row| {
            Ok(SchemaEdge {
                from_label: label_column(row, "FromNode")?,
                relationship: text_column(row, "Relationship")?,
                to_label: label_column(row, "ToNode")?,
            })
        })
    }

    /// Run all four reads; each failure is recorded next to its siblings' results.
    pub fn snapshot(&self) -> SchemaSnapshot {
        let snapshot = SchemaSnapshot {
            labels: self.list_labels(),
            relationship_types: self.list_relationship_types(),
            node_counts: self.count_nodes_by_label(),
            schema_edges: self.list_schema_edges(),
        };
        for err in [
            snapshot.labels.as_ref().err(),
            snapshot.relationship_types.as_ref().err(),
            snapshot.node_counts.as_ref().err(),
            snapshot.schema_edges.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        {
            log::warn!("{}", err);
        }
        snapshot
    }

    /// Property keys per label, used to describe the graph to the query generator.
    pub fn node_properties(&self) -> Result<Vec<(String, Vec<String>)>> {
        let rows = self.store.query(NODE_PROPERTIES_QUERY)?;
        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        for row in rows.rows() {
            let label = label_column(&row, "label")?;
            let prop = text_column(&row, "prop")?;
            match out.last_mut() {
                Some((l, props)) if *l == label => props.push(prop),
                _ => out.push((label, vec![prop])),
            }
        }
        Ok(out)
    }

    /// Plain-text schema: node properties followed by relationship patterns.
    pub fn schema_text(&self) -> Result<String> {
        let props = self.node_properties()?;
        let edges = self.list_schema_edges().map_err(|e| anyhow!("{}", e))?;
        Ok(render_schema_text(&props, &edges))
    }

    fn read<T>(
        &self,
        name: &'static str,
        query: &str,
        convert: impl Fn(&ResultRow<'_>) -> Result<T>,
    ) -> Result<Vec<T>, AppError> {
        let rows: ResultSet = self.store.query(query).map_err(|e| AppError::introspection(name, &e))?;
        rows.rows()
            .map(|row| convert(&row))
            .collect::<Result<Vec<T>>>()
            .map_err(|e| AppError::introspection(name, &e))
    }
}

pub fn render_schema_text(props: &[(String, Vec<String>)], edges: &[SchemaEdge]) -> String {
    let mut out = String::from("Node properties:\n");
    for (label, keys) in props {
        out.push_str(&format!("{} {{{}}}\n", label, keys.join(", ")));
    }
    out.push_str("The relationships:\n");
    for e in edges {
        out.push_str(&format!("(:{})-[:{}]->(:{})\n", e.from_label, e.relationship, e.to_label));
    }
    out
}

fn cell<'r>(row: &ResultRow<'r>, column: &str) -> Result<&'r CellValue> {
    row.get(column).ok_or_else(|| anyhow!("missing column '{}'", column))
}

fn text_column(row: &ResultRow<'_>, column: &str) -> Result<String> {
    match cell(row, column)? {
        CellValue::Text(s) => Ok(s.clone()),
        other => Err(anyhow!("column '{}' is not text: {:?}", column, other)),
    }
}

fn label_column(row: &ResultRow<'_>, column: &str) -> Result<String> {
    match cell(row, column)? {
        CellValue::Null => Ok(NO_LABEL.to_string()),
        _ => text_column(row, column),
    }
}

fn int_column(row: &ResultRow<'_>, column: &str) -> Result<i64> {
    match cell(row, column)? {
        CellValue::Int(i) => Ok(*i),
        other => Err(anyhow!("column '{}' is not an integer: {:?}", column, other)),
    }
}
