use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gql::store::StoreCredentials;
use crate::llm::qa_chain::DEFAULT_TOP_K;

const APP_DIR: &str = "Graph-Chat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    // Connection form defaults; the password is never stored
    #[serde(default = "AppSettings::default_uri")]
    pub neo4j_uri: String,
    #[serde(default = "AppSettings::default_user")]
    pub neo4j_user: String,
    #[serde(default = "AppSettings::default_database")]
    pub neo4j_database: String,
    // Applies to both the Neo4j and the model HTTP calls
    #[serde(default = "AppSettings::default_timeout_secs")]
    pub request_timeout_secs: u64,
    // Rows kept as evidence and sent to the answer prompt
    #[serde(default = "AppSettings::default_top_k")]
    pub top_k: usize,
    #[serde(default = "AppSettings::default_graphviz")]
    pub graphviz_program: String,
    // If None, use OS temporary directory for exports
    #[serde(default)]
    pub export_override: Option<PathBuf>,
    // If None, query logs go to OS temp dir
    #[serde(default)]
    pub query_log_override: Option<PathBuf>,
    #[serde(default = "AppSettings::default_true")]
    pub query_log_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            neo4j_uri: Self::default_uri(),
            neo4j_user: Self::default_user(),
            neo4j_database: Self::default_database(),
            request_timeout_secs: Self::default_timeout_secs(),
            top_k: Self::default_top_k(),
            graphviz_program: Self::default_graphviz(),
            export_override: None,
            query_log_override: None,
            query_log_enabled: true,
        }
    }
}

impl AppSettings {
    fn config_dir() -> PathBuf {
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Graph-Chat
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join(APP_DIR);
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Graph-Chat
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join(APP_DIR);
            }
            return PathBuf::from(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Graph-Chat or ~/.config/Graph-Chat
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join(APP_DIR);
            }
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join(APP_DIR);
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        let json_path = Self::config_dir().join("settings.json");
        if json_path.exists() {
            let mut f = std::fs::File::open(json_path)?;
            let mut s = String::new();
            f.read_to_string(&mut s)?;
            let v: Self = serde_json::from_str(&s)?;
            return Ok(v);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join("settings.json");
        let s = serde_json::to_string_pretty(self)?;
        let mut f = std::fs::File::create(path)?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Return the directory where the settings file (settings.json) is stored.
    /// This is OS-specific and resolves to a per-user configuration directory.
    pub fn settings_dir() -> PathBuf {
        Self::config_dir()
    }

    /// Default export directory when no override is set: OS temporary directory.
    /// Example: {temp_dir}/Graph-Chat/exports
    pub fn export_default_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(APP_DIR);
        p.push("exports");
        p
    }

    /// Effective export directory honoring user override or falling back to OS temp.
    pub fn export_dir(&self) -> PathBuf {
        if let Some(p) = &self.export_override { return p.clone(); }
        Self::export_default_dir()
    }

    /// Example: {temp_dir}/Graph-Chat/query-logs
    pub fn query_log_default_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(APP_DIR);
        p.push("query-logs");
        p
    }

    /// Where executed Cypher is logged, or None when logging is switched off.
    pub fn query_log_dir(&self) -> Option<PathBuf> {
        if !self.query_log_enabled { return None; }
        Some(self.query_log_override.clone().unwrap_or_else(Self::query_log_default_dir))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn credentials(&self, password: &str) -> StoreCredentials {
        StoreCredentials {
            uri: self.neo4j_uri.clone(),
            username: self.neo4j_user.clone(),
            password: password.to_string(),
            database: self.neo4j_database.clone(),
        }
    }

    pub(crate) fn default_uri() -> String { "bolt://localhost:7687".to_string() }
    pub(crate) fn default_user() -> String { "neo4j".to_string() }
    pub(crate) fn default_database() -> String { "neo4j".to_string() }
    pub(crate) fn default_timeout_secs() -> u64 { 60 }
    pub(crate) fn default_top_k() -> usize { DEFAULT_TOP_K }
    pub(crate) fn default_graphviz() -> String { "dot".to_string() }
    pub(crate) fn default_true() -> bool { true }
}
