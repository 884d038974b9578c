use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use graph_chat::error::AppError;
use graph_chat::gql::schema::{
    render_schema_text, SchemaEdge, SchemaIntrospector, LABELS_QUERY, NODE_COUNTS_QUERY, NODE_PROPERTIES_QUERY,
    RELATIONSHIP_TYPES_QUERY, SCHEMA_EDGES_QUERY,
};
use graph_chat::gql::store::{commit_endpoint, parse_tx_response, GraphStore, Neo4jHttpStore, StoreCredentials};
use graph_chat::graph_utils::layout::{graphviz_name, parse_plain, GraphLayout, GraphRenderer};
use graph_chat::graph_utils::projection::{column_color, node_id, project, GRAPH_ROW_LIMIT, NODE_ID_MAX_CHARS};
use graph_chat::graph_utils::result_set::{CellValue, ResultSet};
use graph_chat::gui::graph_view::{hex_color, GraphRender};
use graph_chat::llm::chat_client::{parse_chat_completion, ChatModel};
use graph_chat::llm::credentials::{default_provider, CredentialProvider, read_cli_token, LlmEndpoint, ENV_API_BASE, ENV_API_KEY, ENV_DEPLOYMENT};
use graph_chat::llm::prompts::{extract_cypher, render};
use graph_chat::llm::qa_chain::{CypherQaChain, TranslatorExecutor, TurnAnswer};
use graph_chat::persistence::export::{export_results_csv, export_results_json};
use graph_chat::persistence::settings::AppSettings;
use graph_chat::session::controller::{Connector, ConversationController, EvidenceView, Role, SessionHandles};

// ---------- fakes ----------

#[derive(Default)]
struct FakeStore {
    answers: HashMap<String, std::result::Result<ResultSet, String>>,
    seen: RefCell<Vec<String>>,
}

impl FakeStore {
    fn with(mut self, query: &str, rows: ResultSet) -> Self {
        self.answers.insert(query.to_string(), Ok(rows));
        self
    }

    fn failing(mut self, query: &str, msg: &str) -> Self {
        self.answers.insert(query.to_string(), Err(msg.to_string()));
        self
    }
}

impl GraphStore for FakeStore {
    fn query(&self, cypher: &str) -> Result<ResultSet> {
        self.seen.borrow_mut().push(cypher.to_string());
        match self.answers.get(cypher) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(msg)) => Err(anyhow!("{}", msg)),
            None => Err(anyhow!("unexpected query: {}", cypher)),
        }
    }
}

/// Replies in order and remembers every prompt.
struct FakeModel {
    replies: RefCell<VecDeque<String>>,
    prompts: Arc<RefCell<Vec<String>>>,
}

impl FakeModel {
    fn new(replies: &[&str]) -> (Self, Arc<RefCell<Vec<String>>>) {
        let prompts = Arc::new(RefCell::new(Vec::new()));
        let model = Self {
            replies: RefCell::new(replies.iter().map(|s| s.to_string()).collect()),
            prompts: prompts.clone(),
        };
        (model, prompts)
    }
}

impl ChatModel for FakeModel {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.replies.borrow_mut().pop_front().ok_or_else(|| anyhow!("no scripted reply left"))
    }
}

struct FakeTranslator {
    answer: std::result::Result<TurnAnswer, String>,
}

impl TranslatorExecutor for FakeTranslator {
    fn invoke(&self, _question: &str) -> Result<TurnAnswer> {
        self.answer.clone().map_err(|m| anyhow!("{}", m))
    }
}

struct FakeConnector {
    env: HashMap<&'static str, String>,
    open_error: Option<String>,
    answer: std::result::Result<TurnAnswer, String>,
    opened: RefCell<usize>,
}

impl FakeConnector {
    fn configured(answer: std::result::Result<TurnAnswer, String>) -> Self {
        let mut env = HashMap::new();
        env.insert(ENV_API_BASE, "https://example.openai.azure.com/openai/v1".to_string());
        env.insert(ENV_DEPLOYMENT, "gpt-4o".to_string());
        Self { env, open_error: None, answer, opened: RefCell::new(0) }
    }

    fn unconfigured() -> Self {
        Self { env: HashMap::new(), open_error: None, answer: Ok(TurnAnswer::default()), opened: RefCell::new(0) }
    }
}

impl Connector for FakeConnector {
    fn llm_endpoint(&self) -> std::result::Result<LlmEndpoint, AppError> {
        LlmEndpoint::from_lookup(|k| self.env.get(k).cloned())
    }

    fn open(&self, _store: &StoreCredentials, _llm: &LlmEndpoint) -> Result<SessionHandles> {
        *self.opened.borrow_mut() += 1;
        if let Some(msg) = &self.open_error {
            return Err(anyhow!("{}", msg));
        }
        Ok(SessionHandles {
            store: Arc::new(FakeStore::default()),
            translator: Box::new(FakeTranslator { answer: self.answer.clone() }),
        })
    }
}

struct FakeRenderer(std::result::Result<GraphLayout, String>);

impl GraphRenderer for FakeRenderer {
    fn layout(&self, _dot: &str) -> std::result::Result<GraphLayout, AppError> {
        self.0.clone().map_err(AppError::Rendering)
    }
}

fn creds() -> StoreCredentials {
    AppSettings::default().credentials("secret")
}

fn text_rows(columns: &[&str], rows: &[&[&str]]) -> ResultSet {
    ResultSet::new(
        columns.iter().map(|c| c.to_string()).collect(),
        rows.iter().map(|r| r.iter().map(|v| CellValue::from(*v)).collect()).collect(),
    )
    .expect("well-formed rows")
}

fn answer_with_rows(n: usize) -> TurnAnswer {
    let rows: Vec<Vec<(&str, CellValue)>> = (0..n)
        .map(|i| vec![("city", CellValue::from("London")), ("supplier", CellValue::from(format!("S{}", i)))])
        .collect();
    TurnAnswer {
        answer: "Some suppliers.".into(),
        cypher: Some("MATCH (s:Supplier) RETURN s.city AS city, s.companyName AS supplier".into()),
        evidence: ResultSet::from_records(rows).expect("records"),
    }
}

// ---------- result sets ----------

#[test]
fn result_set_rejects_ragged_rows() {
    let err = ResultSet::new(vec!["a".into(), "b".into()], vec![vec![CellValue::from(1i64)]]);
    assert!(err.is_err());
}

#[test]
fn result_set_from_records_requires_same_columns() {
    let ok = ResultSet::from_records(vec![
        vec![("a", CellValue::from(1i64)), ("b", CellValue::from("x"))],
        vec![("a", CellValue::from(2i64)), ("b", CellValue::Null)],
    ])
    .expect("same keys");
    assert_eq!(ok.columns(), &["a".to_string(), "b".to_string()]);
    assert_eq!(ok.len(), 2);
    assert_eq!(ok.row(1).and_then(|r| r.get("b").cloned()), Some(CellValue::Null));

    let bad = ResultSet::from_records(vec![vec![("a", CellValue::from(1i64))], vec![("b", CellValue::from(2i64))]]);
    assert!(bad.is_err());
}

#[test]
fn cell_values_from_json() {
    assert_eq!(CellValue::from(serde_json::json!(null)), CellValue::Null);
    assert_eq!(CellValue::from(serde_json::json!(3)), CellValue::Int(3));
    assert_eq!(CellValue::from(serde_json::json!("x")), CellValue::Text("x".into()));
    assert!(CellValue::from("   ").is_blank());
    assert!(!CellValue::from(0i64).is_blank());
    assert_eq!(CellValue::Null.to_string(), "");
}

// ---------- projection ----------

#[test]
fn project_needs_rows_and_two_columns() {
    assert!(project(&ResultSet::empty()).is_none());
    assert!(project(&text_rows(&["name"], &[&["Alfreds"], &["Anton"]])).is_none());
    assert!(project(&text_rows(&["a", "b"], &[])).is_none());
}

#[test]
fn project_all_blank_cells_draws_nothing() {
    let rows = ResultSet::new(
        vec!["a".into(), "b".into()],
        vec![vec![CellValue::Null, CellValue::from("  ")]],
    )
    .expect("rows");
    assert!(project(&rows).is_none());
}

#[test]
fn london_suppliers_share_one_city_node() {
    let rows = text_rows(&["city", "supplier"], &[&["London", "Exotic Liquids"], &["London", "New Orleans Cajun"]]);
    let graph = project(&rows).expect("graph");
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.contains_edge("London", "Exotic Liquids"));
    assert!(graph.contains_edge("London", "New Orleans Cajun"));
    let london = graph.node("London").expect("node");
    assert_eq!(london.label, "city: London");
    assert_eq!(london.color, column_color(0));
    assert_eq!(graph.node("Exotic Liquids").map(|n| n.color), Some(column_color(1)));
}

#[test]
fn edges_only_join_existing_nodes() {
    let rows = ResultSet::new(
        vec!["a".into(), "b".into(), "c".into()],
        vec![
            vec![CellValue::from("x"), CellValue::Null, CellValue::from("z")],
            vec![CellValue::from("y"), CellValue::from("w"), CellValue::from("")],
        ],
    )
    .expect("rows");
    let graph = project(&rows).expect("graph");
    for (s, t) in graph.edges() {
        assert!(graph.node(s).is_some() && graph.node(t).is_some());
    }
    // blank cells are skipped, so x links straight to z
    assert!(graph.contains_edge("x", "z"));
    assert!(graph.contains_edge("y", "w"));
    assert_eq!(graph.edge_count(), 2);
}

#[test]
fn projection_is_deterministic() {
    let rows = text_rows(&["a", "b", "c"], &[&["1", "2", "3"], &["3", "2", "1"], &["1", "4", "2"]]);
    let first = project(&rows).expect("graph");
    let second = project(&rows).expect("graph");
    assert_eq!(first, second);
    assert_eq!(first.to_dot(), second.to_dot());
}

#[test]
fn repeated_id_keeps_first_label() {
    let rows = text_rows(&["from", "to"], &[&["A", "B"], &["B", "A"]]);
    let graph = project(&rows).expect("graph");
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.node("B").map(|n| n.label.as_str()), Some("to: B"));
    assert_eq!(graph.node("B").map(|n| n.column_index), Some(1));
    // direction matters
    assert!(graph.contains_edge("A", "B") && graph.contains_edge("B", "A"));
}

#[test]
fn long_values_are_cut_to_fifty_chars() {
    let long = "x".repeat(100);
    assert_eq!(node_id(&long).chars().count(), NODE_ID_MAX_CHARS);
    let rows = text_rows(&["a", "b"], &[&[long.as_str(), "short"]]);
    let graph = project(&rows).expect("graph");
    assert!(graph.node(&"x".repeat(50)).is_some());
    assert_eq!(node_id("  two\nlines \"q\" "), "two lines \\\"q\\\"");
}

#[test]
fn only_the_first_thirty_rows_are_projected() {
    let owned: Vec<Vec<String>> = (0..40).map(|i| vec![format!("k{}", i), format!("v{}", i)]).collect();
    let borrowed: Vec<Vec<&str>> = owned.iter().map(|r| r.iter().map(String::as_str).collect()).collect();
    let slices: Vec<&[&str]> = borrowed.iter().map(Vec::as_slice).collect();
    let rows = text_rows(&["k", "v"], &slices);
    let graph = project(&rows).expect("graph");
    assert_eq!(GRAPH_ROW_LIMIT, 30);
    assert_eq!(graph.node_count(), 60);
    assert!(graph.node("k29").is_some());
    assert!(graph.node("k30").is_none());
}

#[test]
fn sixth_column_reuses_first_color() {
    let rows = text_rows(&["c0", "c1", "c2", "c3", "c4", "c5"], &[&["a", "b", "c", "d", "e", "f"]]);
    let graph = project(&rows).expect("graph");
    let color = |id: &str| graph.node(id).map(|n| n.color);
    assert_eq!(color("f"), color("a"));
    assert_ne!(color("b"), color("a"));
    assert_eq!(hex_color(column_color(0)), eframe::egui::Color32::from_rgb(0x1f, 0x77, 0xb4));
}

#[test]
fn dot_output_shape() {
    let rows = text_rows(&["city", "supplier"], &[&["London", "Exotic \"Liquids\""]]);
    let dot = project(&rows).expect("graph").to_dot();
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("rankdir=LR;"));
    assert!(dot.contains("\"London\" [label=\"city: London\", fillcolor=\"#1f77b4\", fontcolor=\"white\"];"));
    assert!(dot.contains("\"London\" -> \"Exotic \\\"Liquids\\\"\";"));
    assert!(dot.trim_end().ends_with('}'));
}

// ---------- layout ----------

#[test]
fn parse_plain_reads_nodes_and_edges() {
    let plain = "graph 1 3.5 1.2\n\
        node London 0.5 0.6 1 0.5 \"city: London\" filled box black #1f77b4\n\
        node \"Exotic \\\"L\\\"\" 2.8 0.6 1.6 0.5 \"supplier: x\" filled box black #2ca02c\n\
        edge London \"Exotic \\\"L\\\"\" 4 1 0.6 1.3 0.6 1.6 0.6 2 0.6 solid black\n\
        stop\n";
    let layout = parse_plain(plain).expect("layout");
    assert_eq!(layout.width, 3.5);
    assert_eq!(layout.nodes.len(), 2);
    assert_eq!(layout.nodes[1].name, "Exotic \"L\"");
    assert_eq!(layout.edges.len(), 1);
    assert_eq!(layout.edges[0].points.len(), 4);
    assert_eq!(graphviz_name(&node_id("Exotic \"L\"")), layout.nodes[1].name);
}

#[test]
fn parse_plain_rejects_garbage() {
    assert!(parse_plain("").is_err());
    assert!(parse_plain("graph 1 2\n").is_err());
    assert!(parse_plain("graph 1 2 2\nedge a b 3 0 0\n").is_err());
}

#[test]
fn graph_render_falls_back_to_dot_source() {
    let rows = text_rows(&["a", "b"], &[&["x", "y"], &["x", "z"]]);
    let failed = GraphRender::build(&rows, &FakeRenderer(Err("dot not found".into())));
    match &failed {
        GraphRender::Failed { error, dot } => {
            assert!(error.contains("dot not found"));
            assert!(dot.starts_with("digraph G {"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    let drawn = GraphRender::build(&rows, &FakeRenderer(Ok(GraphLayout::default())));
    assert!(matches!(drawn, GraphRender::Drawn { .. }));
    let one_col = GraphRender::build(&text_rows(&["a"], &[&["x"], &["y"]]), &FakeRenderer(Ok(GraphLayout::default())));
    assert!(matches!(one_col, GraphRender::Nothing(_)));
    assert!(one_col.dot().is_none());
}

// ---------- store ----------

#[test]
fn commit_endpoint_maps_bolt_to_http() {
    assert_eq!(commit_endpoint("bolt://localhost:7687", "neo4j").unwrap(), "http://localhost:7474/db/neo4j/tx/commit");
    assert_eq!(commit_endpoint("neo4j+s://db.example.io", "").unwrap(), "https://db.example.io/db/neo4j/tx/commit");
    assert_eq!(commit_endpoint("http://10.0.0.5:7474/", "northwind").unwrap(), "http://10.0.0.5:7474/db/northwind/tx/commit");
    assert!(commit_endpoint("ftp://host", "neo4j").is_err());
    assert!(commit_endpoint("not a uri", "neo4j").is_err());
}

#[test]
fn commit_endpoint_keeps_custom_ports() {
    assert_eq!(commit_endpoint("bolt://dbhost:7999", "neo4j").unwrap(), "http://dbhost:7999/db/neo4j/tx/commit");
    assert_eq!(commit_endpoint("neo4j://dbhost:7687", "neo4j").unwrap(), "http://dbhost:7474/db/neo4j/tx/commit");
    assert_eq!(
        commit_endpoint("neo4j+s://abcd1234.databases.neo4j.io", "neo4j").unwrap(),
        "https://abcd1234.databases.neo4j.io/db/neo4j/tx/commit"
    );
    assert_eq!(
        commit_endpoint("neo4j+s://abcd1234.databases.neo4j.io:7687", "neo4j").unwrap(),
        "https://abcd1234.databases.neo4j.io/db/neo4j/tx/commit"
    );
    assert_eq!(commit_endpoint("bolt+s://secure:9443", "sales").unwrap(), "https://secure:9443/db/sales/tx/commit");
}

#[test]
fn http_store_targets_mapped_endpoint() {
    let mut c = creds();
    c.uri = "bolt://graph.local:7999".into();
    c.database = "northwind".into();
    let store = Neo4jHttpStore::new(&c, std::time::Duration::from_secs(5)).expect("store");
    assert_eq!(store.endpoint(), "http://graph.local:7999/db/northwind/tx/commit");
    c.uri = "gopher://x".into();
    assert!(Neo4jHttpStore::new(&c, std::time::Duration::from_secs(5)).is_err());
}

#[test]
fn tx_response_rows_and_errors() {
    let body = r#"{"results":[{"columns":["city","n"],"data":[{"row":["London",6],"meta":[null,null]},{"row":[null,1]}]}],"errors":[]}"#;
    let rows = parse_tx_response(body).expect("rows");
    assert_eq!(rows.columns(), &["city".to_string(), "n".to_string()]);
    assert_eq!(rows.row(0).and_then(|r| r.get("n").cloned()), Some(CellValue::Int(6)));
    assert_eq!(rows.row(1).and_then(|r| r.get("city").cloned()), Some(CellValue::Null));

    let err = parse_tx_response(
        r#"{"results":[],"errors":[{"code":"Neo.ClientError.Statement.SyntaxError","message":"Invalid input"}]}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("SyntaxError"));
    assert!(parse_tx_response(r#"{"results":[],"errors":[]}"#).expect("empty").is_empty());
}

// ---------- schema ----------

fn schema_store() -> FakeStore {
    FakeStore::default()
        .with(LABELS_QUERY, text_rows(&["label"], &[&["Customer"], &["Order"]]))
        .with(RELATIONSHIP_TYPES_QUERY, text_rows(&["relationshipType"], &[&["PURCHASED"]]))
        .with(
            NODE_COUNTS_QUERY,
            ResultSet::from_records(vec![
                vec![("label", CellValue::from("Order")), ("count", CellValue::from(830i64))],
                vec![("label", CellValue::Null), ("count", CellValue::from(2i64))],
            ])
            .expect("records"),
        )
        .with(SCHEMA_EDGES_QUERY, text_rows(&["FromNode", "Relationship", "ToNode"], &[&["Customer", "PURCHASED", "Order"]]))
        .with(
            NODE_PROPERTIES_QUERY,
            text_rows(&["label", "prop"], &[&["Customer", "city"], &["Customer", "companyName"], &["Order", "orderID"]]),
        )
}

#[test]
fn schema_snapshot_reads_all_four() {
    let store = schema_store();
    let snap = SchemaIntrospector::new(&store).snapshot();
    assert_eq!(snap.labels.as_ref().unwrap(), &vec!["Customer".to_string(), "Order".to_string()]);
    assert_eq!(snap.relationship_types.as_ref().unwrap().len(), 1);
    let counts = snap.node_counts.as_ref().unwrap();
    assert_eq!(counts[0].count, 830);
    assert_eq!(counts[1].label, "(no label)");
    assert_eq!(
        snap.schema_edges.as_ref().unwrap()[0],
        SchemaEdge { from_label: "Customer".into(), relationship: "PURCHASED".into(), to_label: "Order".into() }
    );
}

#[test]
fn one_failing_schema_query_leaves_the_others() {
    let store = schema_store().failing(RELATIONSHIP_TYPES_QUERY, "procedure not found");
    let snap = SchemaIntrospector::new(&store).snapshot();
    assert!(snap.labels.is_ok());
    assert!(snap.node_counts.is_ok());
    assert!(snap.schema_edges.is_ok());
    match &snap.relationship_types {
        Err(AppError::Introspection { message, .. }) => assert!(message.contains("procedure not found")),
        other => panic!("expected introspection error, got {:?}", other),
    }
}

#[test]
fn node_counts_show_ten_in_rows_of_five() {
    let records: Vec<Vec<(&str, CellValue)>> = (0..12)
        .map(|i| vec![("label", CellValue::from(format!("L{}", i))), ("count", CellValue::from(100 - i as i64))])
        .collect();
    let store = schema_store().with(NODE_COUNTS_QUERY, ResultSet::from_records(records).expect("records"));
    let snap = SchemaIntrospector::new(&store).snapshot();
    let rows = snap.node_count_rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.len() == 5));
    assert_eq!(rows[1][4].label, "L9");

    let lines = snap.node_count_lines();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "L0: 100 | L1: 99 | L2: 98 | L3: 97 | L4: 96");
    assert!(lines.iter().all(|l| !l.contains("L10") && !l.contains("L11")));
}

#[test]
fn schema_text_lists_properties_and_patterns() {
    let store = schema_store();
    let text = SchemaIntrospector::new(&store).schema_text().expect("schema");
    assert_eq!(
        text,
        "Node properties:\nCustomer {city, companyName}\nOrder {orderID}\nThe relationships:\n(:Customer)-[:PURCHASED]->(:Order)\n"
    );
    assert_eq!(render_schema_text(&[], &[]), "Node properties:\nThe relationships:\n");
}

// ---------- prompts and model plumbing ----------

#[test]
fn render_fills_known_placeholders_only() {
    let out = render("Schema: {schema}\nQ: {question} {other}", &[("schema", "{x}"), ("question", "Who?")]);
    assert_eq!(out, "Schema: {x}\nQ: Who? {other}");
}

#[test]
fn extract_cypher_strips_fences_and_tag() {
    assert_eq!(extract_cypher("```cypher\nMATCH (n) RETURN n\n```"), "MATCH (n) RETURN n");
    assert_eq!(extract_cypher("Here:\n```\nMATCH (c) RETURN c\n``` done"), "MATCH (c) RETURN c");
    assert_eq!(extract_cypher("  MATCH (n) RETURN n.cypherField "), "MATCH (n) RETURN n.cypherField");
}

#[test]
fn chat_completion_content() {
    let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"MATCH (n) RETURN n"}}]}"#;
    assert_eq!(parse_chat_completion(body).unwrap(), "MATCH (n) RETURN n");
    assert!(parse_chat_completion(r#"{"choices":[]}"#).is_err());
    assert!(parse_chat_completion("<html>").is_err());
}

#[test]
fn cli_token_and_endpoint_config() {
    let (tok, exp) = read_cli_token(r#"{"accessToken":"abc","expires_on":1900000000,"tokenType":"Bearer"}"#).unwrap();
    assert_eq!(tok, "abc");
    assert_eq!(exp, 1_900_000_000);
    assert!(read_cli_token("{}").is_err());

    let missing = LlmEndpoint::from_lookup(|k| (k == ENV_API_BASE).then(|| "https://x".to_string()));
    assert!(matches!(missing, Err(AppError::Configuration(_))));
    let blank = LlmEndpoint::from_lookup(|_| Some("  ".to_string()));
    assert!(blank.is_err());

    let key = default_provider(|k| (k == ENV_API_KEY).then(|| "k-123".to_string()));
    assert_eq!(key.bearer_token().unwrap(), "k-123");
}

#[test]
fn qa_chain_generates_runs_and_answers() {
    let cypher = "MATCH (s:Supplier) RETURN s.city AS city, s.companyName AS supplier";
    let rows = text_rows(&["city", "supplier"], &[&["London", "Exotic Liquids"], &["London", "New Orleans Cajun"], &["Tokyo", "Tokyo Traders"]]);
    let store: Arc<dyn GraphStore> = Arc::new(FakeStore::default().with(cypher, rows));
    let generated = format!("```cypher\n{}\n```", cypher);
    let (model, prompts) = FakeModel::new(&[generated.as_str(), "  Two suppliers are in London.  "]);
    let chain = CypherQaChain::with_schema(store, Box::new(model), "Node properties:\n".into(), 2);

    let answer = chain.invoke("Which suppliers are in London?").expect("answer");
    assert_eq!(answer.answer, "Two suppliers are in London.");
    assert_eq!(answer.cypher.as_deref(), Some(cypher));
    assert_eq!(answer.evidence.len(), 2);

    let prompts = prompts.borrow();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Which suppliers are in London?"));
    assert!(prompts[0].contains("Node properties:"));
    assert!(prompts[1].contains("Exotic Liquids"));
    assert!(!prompts[1].contains("Tokyo Traders"));
}

#[test]
fn qa_chain_reports_failing_query() {
    let store: Arc<dyn GraphStore> = Arc::new(FakeStore::default().failing("MATCH (x) RETURN x", "syntax error"));
    let (model, _) = FakeModel::new(&["MATCH (x) RETURN x"]);
    let chain = CypherQaChain::with_schema(store, Box::new(model), String::new(), 50);
    let err = chain.invoke("anything").unwrap_err();
    assert!(format!("{:#}", err).contains("syntax error"));
}

#[test]
fn qa_chain_reads_schema_on_creation() {
    let store = Arc::new(schema_store());
    let (model, _) = FakeModel::new(&[]);
    let chain = CypherQaChain::new(store.clone(), Box::new(model), 50).expect("chain");
    assert!(chain.schema().contains("(:Customer)-[:PURCHASED]->(:Order)"));
    assert!(store.seen.borrow().contains(&NODE_PROPERTIES_QUERY.to_string()));
}

// ---------- conversation controller ----------

#[test]
fn missing_configuration_blocks_connect() {
    let connector = FakeConnector::unconfigured();
    let mut ctl = ConversationController::new();
    let err = ctl.connect(&creds(), &connector).unwrap_err();
    assert!(matches!(err, AppError::Configuration(_)));
    assert!(err.to_string().contains(ENV_API_BASE));
    assert!(!ctl.is_connected());
    assert!(ctl.turns().is_empty());
    assert_eq!(*connector.opened.borrow(), 0);
}

#[test]
fn failed_open_stays_disconnected() {
    let mut connector = FakeConnector::configured(Ok(TurnAnswer::default()));
    connector.open_error = Some("connection refused".into());
    let mut ctl = ConversationController::new();
    match ctl.connect(&creds(), &connector) {
        Err(AppError::Connection(msg)) => assert!(msg.contains("connection refused")),
        other => panic!("expected connection error, got {:?}", other.err()),
    }
    assert!(!ctl.is_connected());
    assert!(ctl.turns().is_empty());
}

#[test]
fn ask_before_connect_is_rejected() {
    let mut ctl = ConversationController::new();
    assert!(matches!(ctl.ask("Who?"), Err(AppError::NotConnected)));
    assert!(ctl.turns().is_empty());
    assert!(matches!(ctl.schema(), Err(AppError::NotConnected)));
}

#[test]
fn successful_turn_appends_user_then_assistant() {
    let connector = FakeConnector::configured(Ok(answer_with_rows(2)));
    let mut ctl = ConversationController::new();
    ctl.connect(&creds(), &connector).expect("connect");
    assert!(ctl.is_connected());
    // second connect keeps the session
    ctl.connect(&creds(), &connector).expect("reconnect");
    assert_eq!(*connector.opened.borrow(), 1);

    let turn = ctl.ask("  Which suppliers are in London?  ").expect("turn");
    assert_eq!(turn.role, Role::Assistant);
    assert_eq!(turn.content, "Some suppliers.");
    let turns = ctl.turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "Which suppliers are in London?");
    assert!(turns[0].evidence.is_none());
    assert!(turns[1].cypher.is_some());
}

#[test]
fn failing_turn_keeps_only_the_user_turn() {
    let connector = FakeConnector::configured(Err("model timed out".into()));
    let mut ctl = ConversationController::new();
    ctl.connect(&creds(), &connector).expect("connect");
    match ctl.ask("How many orders?") {
        Err(e @ AppError::TurnExecution { .. }) => {
            assert!(e.to_string().contains("model timed out"));
            assert!(e.detail().is_some());
        }
        other => panic!("expected turn error, got {:?}", other.map(|t| t.content.clone())),
    }
    assert_eq!(ctl.turns().len(), 1);
    assert_eq!(ctl.turns()[0].role, Role::User);
    assert!(ctl.is_connected());
}

#[test]
fn empty_question_adds_nothing() {
    let connector = FakeConnector::configured(Ok(answer_with_rows(1)));
    let mut ctl = ConversationController::new();
    ctl.connect(&creds(), &connector).expect("connect");
    assert!(ctl.ask("   ").is_err());
    assert!(ctl.turns().is_empty());
}

#[test]
fn evidence_view_needs_two_rows_for_a_graph() {
    for (n, expected) in [
        (0, EvidenceView { table: false, graph: false }),
        (1, EvidenceView { table: true, graph: false }),
        (2, EvidenceView { table: true, graph: true }),
    ] {
        let connector = FakeConnector::configured(Ok(answer_with_rows(n)));
        let mut ctl = ConversationController::new();
        ctl.connect(&creds(), &connector).expect("connect");
        let view = ctl.ask("q").expect("turn").evidence_view();
        assert_eq!(view, expected, "{} row(s)", n);
    }
}

#[test]
fn blank_cypher_is_not_kept() {
    let mut answer = answer_with_rows(1);
    answer.cypher = Some("   ".into());
    let connector = FakeConnector::configured(Ok(answer));
    let mut ctl = ConversationController::new();
    ctl.connect(&creds(), &connector).expect("connect");
    assert!(ctl.ask("q").expect("turn").cypher.is_none());
}

// ---------- settings and export ----------

#[test]
fn settings_defaults_and_partial_json() {
    let s = AppSettings::default();
    assert_eq!(s.neo4j_uri, "bolt://localhost:7687");
    assert_eq!(s.neo4j_user, "neo4j");
    assert_eq!(s.top_k, 50);
    let partial: AppSettings = serde_json::from_str(r#"{"neo4j_uri":"http://db:7474"}"#).expect("settings");
    assert_eq!(partial.neo4j_uri, "http://db:7474");
    assert_eq!(partial.graphviz_program, "dot");
    let json = serde_json::to_string(&s).expect("json");
    assert!(!json.contains("secret"));
}

fn temp_path(name: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("graph_chat_test_{}_{}", std::process::id(), name));
    p
}

#[test]
fn export_csv_and_json() {
    let rows = ResultSet::new(
        vec!["city".into(), "n".into()],
        vec![vec![CellValue::from("London"), CellValue::from(6i64)], vec![CellValue::Null, CellValue::from(1i64)]],
    )
    .expect("rows");

    let csv_path = temp_path("rows.csv");
    export_results_csv(&rows, &csv_path).expect("csv");
    let mut rdr = csv::Reader::from_path(&csv_path).expect("reader");
    let headers = rdr.headers().expect("headers").clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["city", "n"]);
    let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.expect("record")).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(&records[0][0], "London");
    assert_eq!(&records[1][0], "");
    let _ = std::fs::remove_file(&csv_path);

    let json_path = temp_path("rows.json");
    export_results_json(&rows, &json_path).expect("json");
    let text = std::fs::read_to_string(&json_path).expect("read");
    assert!(text.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(&text).expect("parse");
    assert_eq!(value[0]["city"], "London");
    assert!(value[1]["city"].is_null());
    let _ = std::fs::remove_file(&json_path);
}
