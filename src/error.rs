use thiserror::Error;

/// Failures surfaced at an interaction boundary (connect, schema panel, chat turn, graph view).
///
/// Collaborators report `anyhow` errors; they are classified here once they reach
/// the component that recovers from them.
#[derive(Debug, Error)]
pub enum AppError {
    /// Required environment configuration is missing. Raised before any network call.
    #[error("{0}")]
    Configuration(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected: connect to the graph database first")]
    NotConnected,

    #[error("{query} failed: {message}")]
    Introspection { query: &'static str, message: String },

    /// `detail` carries the full cause chain; frontends show it only on request.
    #[error("{message}")]
    TurnExecution { message: String, detail: String },

    #[error("Could not render graph: {0}")]
    Rendering(String),
}

impl AppError {
    pub fn connection(err: &anyhow::Error) -> Self {
        AppError::Connection(format!("{:#}", err))
    }

    pub fn introspection(query: &'static str, err: &anyhow::Error) -> Self {
        AppError::Introspection { query, message: format!("{:#}", err) }
    }

    pub fn turn(err: &anyhow::Error) -> Self {
        AppError::TurnExecution { message: err.to_string(), detail: format!("{:?}", err) }
    }

    /// Diagnostic text for an "Error Details" expander; `None` when the message says it all.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AppError::TurnExecution { detail, .. } => Some(detail.as_str()),
            _ => None,
        }
    }
}
