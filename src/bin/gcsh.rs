// gcsh: Graph-Chat Shell (optional CLI client)
// Build with: cargo build --features cli --bin gcsh

use clap::{Arg, ArgAction, Command};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use graph_chat::gql::schema::SchemaSnapshot;
use graph_chat::graph_utils::projection::project;
use graph_chat::graph_utils::result_set::ResultSet;
use graph_chat::llm::prompts::EXAMPLE_QUERIES;
use graph_chat::persistence::settings::AppSettings;
use graph_chat::session::connector::AzureNeo4jConnector;
use graph_chat::session::controller::{ConversationController, ConversationTurn};

const MAX_CELL_WIDTH: usize = 40;

fn main() {
    env_logger::init();
    let settings = AppSettings::load().unwrap_or_default();

    let matches = Command::new("gcsh")
        .about("Graph-Chat Shell: ask questions of a Neo4j graph from the terminal")
        .arg(Arg::new("uri").long("uri").value_name("URI").help("Neo4j URI (defaults to the saved setting)"))
        .arg(Arg::new("user").long("user").value_name("NAME").help("Neo4j username"))
        .arg(Arg::new("password").long("password").value_name("PASSWORD").help("Neo4j password (or NEO4J_PASSWORD)"))
        .arg(Arg::new("database").long("database").value_name("DB").help("Neo4j database name"))
        .arg(Arg::new("eval").short('e').long("eval").value_name("QUESTION").help("Ask a single question and exit"))
        .arg(Arg::new("quiet").short('q').long("quiet").action(ArgAction::SetTrue).help("Suppress banner/help text"))
        .get_matches();

    let password = matches
        .get_one::<String>("password")
        .cloned()
        .or_else(|| std::env::var("NEO4J_PASSWORD").ok())
        .unwrap_or_default();
    let mut creds = settings.credentials(&password);
    if let Some(uri) = matches.get_one::<String>("uri") { creds.uri = uri.clone(); }
    if let Some(user) = matches.get_one::<String>("user") { creds.username = user.clone(); }
    if let Some(db) = matches.get_one::<String>("database") { creds.database = db.clone(); }
    let eval = matches.get_one::<String>("eval").cloned();
    let quiet = matches.get_flag("quiet");

    let mut controller = ConversationController::new();
    let connector = AzureNeo4jConnector::from_settings(&settings);
    if let Err(e) = controller.connect(&creds, &connector) {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    // One-off eval mode
    if let Some(question) = eval {
        match controller.ask(&question) {
            Ok(turn) => print_turn(turn),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(3);
            }
        }
        return;
    }

    let mut rl: Editor<(), DefaultHistory> = match Editor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("failed to initialize editor: {}", e);
            std::process::exit(1);
        }
    };
    let mut hist_path = AppSettings::settings_dir();
    hist_path.push("gcsh_history.txt");
    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or_else(|| std::path::Path::new(".")));
    let _ = rl.load_history(&hist_path);

    if !quiet {
        eprintln!(
            "Connected to {}.\nAsk a question and press Enter. Commands: :help, :quit. History saved at {}.\n",
            creds.uri,
            hist_path.display()
        );
    }

    loop {
        match rl.readline("gcsh> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() { continue; }
                if input == ":quit" || input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") { break; }
                rl.add_history_entry(input).ok();
                match input {
                    ":help" | "?" => print_help(),
                    ":examples" => EXAMPLE_QUERIES.iter().for_each(|q| println!("  {}", q)),
                    ":schema" => match controller.schema() {
                        Ok(s) => print_schema(&s),
                        Err(e) => eprintln!("Error: {}", e),
                    },
                    ":dot" => print_last_dot(controller.turns()),
                    question => match controller.ask(question) {
                        Ok(turn) => print_turn(turn),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            if let Some(detail) = e.detail().filter(|d| !d.is_empty()) {
                                log::debug!("{}", detail);
                            }
                        }
                    },
                }
            }
            Err(ReadlineError::Interrupted) => { // Ctrl-C
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break, // Ctrl-D
            Err(e) => {
                eprintln!("readline error: {}", e);
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);
}

fn print_help() {
    println!(
        "Commands:\n  :help or ?    Show this help\n  :examples     List example questions\n  :schema       Show labels, relationship types and counts\n  :dot          Print the DOT graph of the last answer\n  :quit         Exit gcsh\nAnything else is asked as a question."
    );
}

fn print_turn(turn: &ConversationTurn) {
    println!("{}", turn.content);
    if let Some(cypher) = &turn.cypher {
        println!("\n-- Cypher\n{}", cypher);
    }
    if let Some(rows) = &turn.evidence {
        if rows.is_empty() {
            println!("\n(no data returned from query)");
        } else {
            println!();
            print_table(rows);
        }
    }
}

fn print_last_dot(turns: &[ConversationTurn]) {
    let Some(turn) = turns.last() else {
        println!("(nothing asked yet)");
        return;
    };
    match (&turn.evidence, turn.evidence_view().graph) {
        (Some(rows), true) => match project(rows) {
            Some(graph) => println!("{}", graph.to_dot()),
            None => println!("(nothing to draw)"),
        },
        _ => println!("(the last answer has fewer than two rows)"),
    }
}

fn clip(s: String) -> String {
    if s.chars().count() <= MAX_CELL_WIDTH { return s; }
    let mut out: String = s.chars().take(MAX_CELL_WIDTH - 1).collect();
    out.push('…');
    out
}

fn print_table(rows: &ResultSet) {
    let cells: Vec<Vec<String>> = rows
        .rows()
        .map(|r| r.cells().iter().map(|c| clip(c.to_string())).collect())
        .collect();
    let mut widths: Vec<usize> = rows.columns().iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.chars().count());
        }
    }
    let line = |vals: &[String]| {
        let parts: Vec<String> = vals.iter().zip(&widths).map(|(v, w)| format!("{:<w$}", v, w = *w)).collect();
        println!("| {} |", parts.join(" | "));
    };
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(rows.columns());
    println!("|-{}-|", sep.join("-|-"));
    for row in &cells {
        line(row);
    }
    println!("({} rows)", rows.len());
}

fn print_schema(s: &SchemaSnapshot) {
    match &s.labels {
        Ok(labels) => println!("Labels: {}", labels.join(", ")),
        Err(e) => eprintln!("{}", e),
    }
    match &s.relationship_types {
        Ok(types) => println!("Relationship types: {}", types.join(", ")),
        Err(e) => eprintln!("{}", e),
    }
    match &s.node_counts {
        Ok(_) => {
            println!("Node counts:");
            for line in s.node_count_lines() { println!("  {}", line); }
        }
        Err(e) => eprintln!("{}", e),
    }
    match &s.schema_edges {
        Ok(edges) => {
            println!("Relationships:");
            for e in edges { println!("  (:{})-[:{}]->(:{})", e.from_label, e.relationship, e.to_label); }
        }
        Err(e) => eprintln!("{}", e),
    }
}
