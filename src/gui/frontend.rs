use std::collections::HashMap;

use eframe::egui::{self, Color32, RichText};
use uuid::Uuid;

use crate::error::AppError;
use crate::gql::schema::SchemaSnapshot;
use crate::gql::store::StoreCredentials;
use crate::graph_utils::layout::GraphvizRenderer;
use crate::graph_utils::result_set::ResultSet;
use crate::llm::prompts::EXAMPLE_QUERIES;
use crate::persistence::export::{default_export_path, export_results, ExportFormat};
use crate::persistence::settings::AppSettings;
use crate::session::connector::AzureNeo4jConnector;
use crate::session::controller::{ConversationController, ConversationTurn, Role};
use super::graph_view::{self, GraphRender};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Tab {
    Chat,
    Schema,
    Examples,
}

/// A question waiting for its turn. It is drawn with a spinner for one frame before
/// the blocking call runs.
struct PendingQuestion {
    text: String,
    shown: bool,
}

pub struct ChatApp {
    settings: AppSettings,
    connector: AzureNeo4jConnector,
    renderer: GraphvizRenderer,
    controller: ConversationController,
    // Connection form
    uri: String,
    username: String,
    password: String,
    database: String,
    connect_error: Option<AppError>,
    tab: Tab,
    input: String,
    pending: Option<PendingQuestion>,
    turn_error: Option<AppError>,
    schema: Option<Result<SchemaSnapshot, AppError>>,
    // Graph views are laid out once per assistant turn
    graphs: HashMap<Uuid, GraphRender>,
    // Last export outcome: (message, is_error)
    notice: Option<(String, bool)>,
}

impl ChatApp {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            connector: AzureNeo4jConnector::from_settings(&settings),
            renderer: GraphvizRenderer::new(settings.graphviz_program.clone()),
            controller: ConversationController::new(),
            uri: settings.neo4j_uri.clone(),
            username: settings.neo4j_user.clone(),
            password: String::new(),
            database: settings.neo4j_database.clone(),
            connect_error: None,
            tab: Tab::Chat,
            input: String::new(),
            pending: None,
            turn_error: None,
            schema: None,
            graphs: HashMap::new(),
            notice: None,
            settings,
        }
    }

    fn connect(&mut self) {
        let creds = StoreCredentials {
            uri: self.uri.trim().to_string(),
            username: self.username.trim().to_string(),
            password: self.password.clone(),
            database: self.database.trim().to_string(),
        };
        match self.controller.connect(&creds, &self.connector) {
            Ok(()) => {
                self.connect_error = None;
                self.schema = None;
                self.settings.neo4j_uri = creds.uri;
                self.settings.neo4j_user = creds.username;
                self.settings.neo4j_database = creds.database;
                if let Err(e) = self.settings.save() {
                    log::warn!("could not save settings: {:#}", e);
                }
            }
            Err(e) => self.connect_error = Some(e),
        }
    }

    fn submit(&mut self, question: String) {
        if question.trim().is_empty() || self.pending.is_some() {
            return;
        }
        self.pending = Some(PendingQuestion { text: question, shown: false });
    }

    /// Runs the pending question once its spinner has been on screen.
    fn run_pending(&mut self) {
        if !self.pending.as_ref().map(|p| p.shown).unwrap_or(false) {
            return;
        }
        let Some(p) = self.pending.take() else { return };
        self.turn_error = None;
        match self.controller.ask(&p.text) {
            Ok(turn) => log::debug!("turn {} answered", turn.id),
            Err(e) => self.turn_error = Some(e),
        }
    }

    fn sidebar(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("connection_panel")
            .resizable(true)
            .default_width(270.0)
            .show(ctx, |ui| {
                ui.heading("Graph-Chat");
                ui.label("Ask questions of a Neo4j graph in plain language.");
                ui.separator();
                ui.strong("Graph Dataset");
                ui.label("Northwind: customers, orders, products, categories, suppliers, employees and shippers.");
                ui.separator();

                ui.strong("Neo4j Connection");
                let connected = self.controller.is_connected();
                ui.add_enabled_ui(!connected, |ui| {
                    egui::Grid::new("connection_form").num_columns(2).show(ui, |ui| {
                        ui.label("URI");
                        ui.text_edit_singleline(&mut self.uri);
                        ui.end_row();
                        ui.label("Username");
                        ui.text_edit_singleline(&mut self.username);
                        ui.end_row();
                        ui.label("Password");
                        ui.add(egui::TextEdit::singleline(&mut self.password).password(true));
                        ui.end_row();
                        ui.label("Database");
                        ui.text_edit_singleline(&mut self.database);
                        ui.end_row();
                    });
                });
                if ui.add_enabled(!connected, egui::Button::new("Connect")).clicked() {
                    self.connect();
                }

                if self.controller.is_connected() {
                    ui.colored_label(Color32::GREEN, "Connected to Neo4j and the language model");
                } else {
                    ui.colored_label(Color32::YELLOW, "Not connected");
                }
                if let Some(err) = &self.connect_error {
                    error_block(ui, err, "connect_error");
                }
            });
    }

    fn chat_tab(&mut self, ctx: &egui::Context) {
        if !self.controller.is_connected() {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.heading("Chat with Graph");
                ui.label("Configure connection settings in the sidebar and click Connect.");
            });
            return;
        }

        let mut submitted: Option<String> = None;
        egui::TopBottomPanel::bottom("chat_input").show(ctx, |ui| {
            if let Some((msg, is_err)) = &self.notice {
                let col = if *is_err { Color32::RED } else { Color32::LIGHT_GREEN };
                ui.small(RichText::new(msg).color(col));
            }
            ui.horizontal(|ui| {
                let busy = self.pending.is_some();
                let edit = egui::TextEdit::singleline(&mut self.input)
                    .hint_text("Ask a question about the graph")
                    .desired_width(ui.available_width() - 60.0);
                let resp = ui.add_enabled(!busy, edit);
                let enter = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                let clicked = ui.add_enabled(!busy, egui::Button::new("Ask")).clicked();
                if enter || clicked {
                    submitted = Some(std::mem::take(&mut self.input));
                }
            });
        });
        if let Some(q) = submitted {
            self.submit(q);
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    let turns = self.controller.turns();
                    let last = turns.len().saturating_sub(1);
                    for (i, turn) in turns.iter().enumerate() {
                        show_turn(ui, turn, i == last, &mut self.graphs, &self.renderer, &self.settings, &mut self.notice);
                        ui.add_space(6.0);
                    }
                    if let Some(err) = &self.turn_error {
                        error_block(ui, err, "turn_error");
                    }
                    if let Some(p) = &mut self.pending {
                        egui::Frame::group(ui.style()).show(ui, |ui| {
                            ui.label(RichText::new("You").strong());
                            ui.label(&p.text);
                        });
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label("Generating Cypher and querying the graph...");
                        });
                        p.shown = true;
                        ctx.request_repaint();
                    }
                });
        });
    }

    fn schema_tab(&mut self, ui: &mut egui::Ui) {
        ui.heading("Graph Schema");
        if !self.controller.is_connected() {
            ui.label("Connect to the database to explore its schema.");
            return;
        }
        if ui.button("Refresh").clicked() {
            self.schema = None;
        }
        let controller = &self.controller;
        match self.schema.get_or_insert_with(|| controller.schema()) {
            Ok(snapshot) => show_snapshot(ui, snapshot),
            Err(e) => error_block(ui, e, "schema_error"),
        }
    }

    fn examples_tab(&mut self, ui: &mut egui::Ui) {
        ui.heading("Example Questions");
        ui.label("Try one of these in the chat:");
        ui.add_space(6.0);
        let connected = self.controller.is_connected();
        let mut chosen = None;
        for q in EXAMPLE_QUERIES {
            ui.horizontal(|ui| {
                ui.code(q);
                if ui.small_button("Copy").clicked() {
                    ui.ctx().copy_text(q.to_string());
                }
                if connected && ui.small_button("Ask").clicked() {
                    chosen = Some(q.to_string());
                }
            });
        }
        if let Some(q) = chosen {
            self.tab = Tab::Chat;
            self.submit(q);
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.run_pending();
        self.sidebar(ctx);

        egui::TopBottomPanel::top("tab_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, Tab::Chat, "Chat with Graph");
                ui.selectable_value(&mut self.tab, Tab::Schema, "Schema Explorer");
                ui.selectable_value(&mut self.tab, Tab::Examples, "Examples");
            });
        });

        match self.tab {
            Tab::Chat => self.chat_tab(ctx),
            Tab::Schema => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| self.schema_tab(ui));
                });
            }
            Tab::Examples => {
                egui::CentralPanel::default().show(ctx, |ui| self.examples_tab(ui));
            }
        }
    }
}

fn error_block(ui: &mut egui::Ui, err: &AppError, salt: &str) {
    ui.colored_label(Color32::RED, format!("Error: {}", err));
    if let Some(detail) = err.detail().filter(|d| !d.is_empty()) {
        egui::CollapsingHeader::new("Error Details").id_salt(salt).show(ui, |ui| {
            ui.code(detail);
        });
    }
}

fn show_turn(
    ui: &mut egui::Ui,
    turn: &ConversationTurn,
    is_last: bool,
    graphs: &mut HashMap<Uuid, GraphRender>,
    renderer: &GraphvizRenderer,
    settings: &AppSettings,
    notice: &mut Option<(String, bool)>,
) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.set_width(ui.available_width());
        let who = match turn.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        ui.label(RichText::new(who).strong());
        ui.label(&turn.content);

        if let Some(cypher) = &turn.cypher {
            egui::CollapsingHeader::new("Cypher Query").id_salt((turn.id, "cypher")).show(ui, |ui| {
                ui.code(cypher);
            });
        }

        let Some(rows) = &turn.evidence else { return };
        let view = turn.evidence_view();
        if !view.table {
            ui.small("No data returned from query.");
            return;
        }
        egui::CollapsingHeader::new(format!("Query Results ({} rows)", rows.len()))
            .id_salt((turn.id, "results"))
            .default_open(is_last)
            .show(ui, |ui| {
                results_table(ui, rows, turn.id);
                ui.horizontal(|ui| {
                    for format in [ExportFormat::Csv, ExportFormat::Json] {
                        let text = format!("Export {}", format.extension().to_uppercase());
                        if ui.small_button(text).clicked() {
                            *notice = Some(export_notice(rows, settings, format));
                        }
                    }
                });
            });
        if view.graph {
            egui::CollapsingHeader::new("Graph View")
                .id_salt((turn.id, "graph"))
                .default_open(is_last)
                .show(ui, |ui| {
                    let render = graphs.entry(turn.id).or_insert_with(|| GraphRender::build(rows, renderer));
                    graph_view::show(ui, render, (turn.id, "dot"));
                });
        }
    });
}

fn results_table(ui: &mut egui::Ui, rows: &ResultSet, salt: Uuid) {
    egui::ScrollArea::both()
        .id_salt((salt, "table_scroll"))
        .max_height(280.0)
        .show(ui, |ui| {
            egui::Grid::new((salt, "table")).striped(true).show(ui, |ui| {
                for col in rows.columns() {
                    ui.strong(col);
                }
                ui.end_row();
                for row in rows.rows() {
                    for cell in row.cells() {
                        ui.label(cell.to_string());
                    }
                    ui.end_row();
                }
            });
        });
}

fn export_notice(rows: &ResultSet, settings: &AppSettings, format: ExportFormat) -> (String, bool) {
    let path = default_export_path(settings, format);
    match export_results(rows, &path, format) {
        Ok(()) => {
            log::info!("exported {} rows to {}", rows.len(), path.display());
            (format!("Exported {} rows to {}", rows.len(), path.display()), false)
        }
        Err(e) => (format!("Export failed: {}", e), true),
    }
}

fn show_snapshot(ui: &mut egui::Ui, snapshot: &SchemaSnapshot) {
    ui.columns(2, |cols| {
        cols[0].strong("Node Labels");
        match &snapshot.labels {
            Ok(labels) => labels.iter().for_each(|l| {
                cols[0].label(format!("• {}", l));
            }),
            Err(e) => {
                cols[0].colored_label(Color32::RED, e.to_string());
            }
        }
        cols[1].strong("Relationship Types");
        match &snapshot.relationship_types {
            Ok(types) => types.iter().for_each(|t| {
                cols[1].label(format!("• {}", t));
            }),
            Err(e) => {
                cols[1].colored_label(Color32::RED, e.to_string());
            }
        }
    });

    ui.separator();
    ui.strong("Node Counts");
    match &snapshot.node_counts {
        Ok(_) => {
            for chunk in snapshot.node_count_rows() {
                ui.horizontal(|ui| {
                    for lc in chunk {
                        egui::Frame::group(ui.style()).show(ui, |ui| {
                            ui.vertical(|ui| {
                                ui.small(&lc.label);
                                ui.heading(lc.count.to_string());
                            });
                        });
                    }
                });
            }
        }
        Err(e) => {
            ui.colored_label(Color32::RED, e.to_string());
        }
    }

    ui.separator();
    ui.strong("Schema Relationships");
    match &snapshot.schema_edges {
        Ok(edges) if edges.is_empty() => {
            ui.label("No relationships found.");
        }
        Ok(edges) => {
            egui::Grid::new("schema_edges").striped(true).show(ui, |ui| {
                ui.strong("FromNode");
                ui.strong("Relationship");
                ui.strong("ToNode");
                ui.end_row();
                for e in edges {
                    ui.label(&e.from_label);
                    ui.label(&e.relationship);
                    ui.label(&e.to_label);
                    ui.end_row();
                }
            });
        }
        Err(e) => {
            ui.colored_label(Color32::RED, e.to_string());
        }
    }
}
