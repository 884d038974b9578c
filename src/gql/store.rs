use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use time::{macros::format_description, OffsetDateTime};
use url::Url;

use crate::graph_utils::result_set::{CellValue, ResultSet};

const BOLT_DEFAULT_PORT: u16 = 7687;
const HTTP_DEFAULT_PORT: u16 = 7474;

/// Anything that can run a Cypher statement and hand back its rows.
pub trait GraphStore {
    fn query(&self, cypher: &str) -> Result<ResultSet>;
}

/// Connection parameters entered by the user. The password only lives as long as
/// the connect action that uses it.
#[derive(Clone, Debug)]
pub struct StoreCredentials {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

/// Neo4j reached through its transactional HTTP endpoint.
pub struct Neo4jHttpStore {
    endpoint: String,
    authorization: String,
    agent: ureq::Agent,
    audit_dir: Option<PathBuf>,
}

impl Neo4jHttpStore {
    pub fn new(creds: &StoreCredentials, timeout: Duration) -> Result<Self> {
        let endpoint = commit_endpoint(&creds.uri, &creds.database)?;
        let token = BASE64.encode(format!("{}:{}", creds.username, creds.password));
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            endpoint,
            authorization: format!("Basic {}", token),
            agent,
            audit_dir: None,
        })
    }

    /// Build the store and run a trivial statement so bad URIs or credentials fail now
    /// rather than on the first question.
    pub fn connect(creds: &StoreCredentials, timeout: Duration) -> Result<Self> {
        let store = Self::new(creds, timeout)?;
        store
            .query("RETURN 1 AS ok")
            .with_context(|| format!("could not reach Neo4j at {}", creds.uri))?;
        log::info!("connected to Neo4j via {}", store.endpoint());
        Ok(store)
    }

    /// Append every executed statement to a dated log file under `dir`.
    pub fn with_audit_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = Some(dir.into());
        self
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    fn execute(&self, cypher: &str) -> Result<ResultSet> {
        let body = serde_json::json!({
            "statements": [{ "statement": cypher, "resultDataContents": ["row"] }]
        });
        let resp = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &self.authorization)
            .set("Accept", "application/json")
            .send_json(body);
        let text = match resp {
            Ok(r) => r.into_string()?,
            Err(ureq::Error::Status(code, r)) => {
                let detail = r.into_string().unwrap_or_default();
                return Err(anyhow!("Neo4j returned HTTP {}: {}", code, detail.trim()));
            }
            Err(e) => return Err(anyhow!("request to {} failed: {}", self.endpoint, e)),
        };
        parse_tx_response(&text)
    }
}

impl GraphStore for Neo4jHttpStore {
    fn query(&self, cypher: &str) -> Result<ResultSet> {
        log::debug!("cypher: {}", cypher.trim());
        let res = self.execute(cypher);
        if let Some(dir) = &self.audit_dir {
            log_query(dir, cypher, &res);
        }
        res
    }
}

/// Map a user-facing URI onto the HTTP commit endpoint.
///
/// Bolt URIs keep their host and any non-default port. The default Bolt port maps
/// to 7474 for plain connections; encrypted ones use the host's HTTPS port, which
/// is where hosted instances serve the HTTP API.
pub fn commit_endpoint(uri: &str, database: &str) -> Result<String> {
    let parsed = Url::parse(uri.trim()).with_context(|| format!("invalid Neo4j URI '{}'", uri))?;
    let host = parsed.host_str().ok_or_else(|| anyhow!("Neo4j URI '{}' has no host", uri))?;
    let custom_port = parsed.port().filter(|&p| p != BOLT_DEFAULT_PORT);
    let base = match parsed.scheme() {
        "http" | "https" => parsed.as_str().trim_end_matches('/').to_string(),
        "bolt" | "neo4j" => format!("http://{}:{}", host, custom_port.unwrap_or(HTTP_DEFAULT_PORT)),
        "bolt+s" | "neo4j+s" | "bolt+ssc" | "neo4j+ssc" => match custom_port {
            Some(port) => format!("https://{}:{}", host, port),
            None => format!("https://{}", host),
        },
        other => return Err(anyhow!("unsupported Neo4j URI scheme '{}'", other)),
    };
    let db = if database.trim().is_empty() { "neo4j" } else { database.trim() };
    Ok(format!("{}/db/{}/tx/commit", base, db))
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<JsonValue>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Parse a transactional endpoint response for a single statement.
pub fn parse_tx_response(body: &str) -> Result<ResultSet> {
    let resp: TxResponse = serde_json::from_str(body).context("malformed Neo4j response")?;
    if let Some(err) = resp.errors.first() {
        return Err(anyhow!("{}: {}", err.code, err.message));
    }
    let Some(result) = resp.results.into_iter().next() else {
        return Ok(ResultSet::empty());
    };
    let rows = result
        .data
        .into_iter()
        .map(|d| d.row.into_iter().map(CellValue::from).collect())
        .collect();
    ResultSet::new(result.columns, rows)
}

fn log_path_for_now(dir: &Path) -> PathBuf {
    let now = OffsetDateTime::now_utc();
    let fmt = format_description!("[year][month][day]");
    let date = now.format(&fmt).unwrap_or_else(|_| "unknown".into());
    dir.join(format!("queries_{}.log", date))
}

fn log_query(dir: &Path, query: &str, outcome: &Result<ResultSet>) {
    if let Err(e) = create_dir_all(dir) {
        log::warn!("cannot create query log dir {}: {}", dir.display(), e);
        return;
    }
    let path = log_path_for_now(dir);
    let now = OffsetDateTime::now_utc();
    let ts_fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let ts = now.format(&ts_fmt).unwrap_or_else(|_| "".into());
    let status = match outcome {
        Ok(rows) => format!("OK rows={}", rows.len()),
        Err(e) => format!("ERR {}", e),
    };
    let line = format!("{} | {}\n{}\n\n", ts, status, query.trim());
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
        let _ = file.write_all(line.as_bytes());
    }
}
