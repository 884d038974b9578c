use std::sync::Arc;

use uuid::Uuid;

use crate::error::AppError;
use crate::gql::schema::{SchemaIntrospector, SchemaSnapshot};
use crate::gql::store::{GraphStore, StoreCredentials};
use crate::graph_utils::result_set::ResultSet;
use crate::llm::credentials::LlmEndpoint;
use crate::llm::qa_chain::{TranslatorExecutor, TurnAnswer};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub cypher: Option<String>,
    pub evidence: Option<ResultSet>,
}

impl ConversationTurn {
    pub fn user(question: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7(), role: Role::User, content: question.into(), cypher: None, evidence: None }
    }

    pub fn assistant(answer: TurnAnswer) -> Self {
        Self {
            id: Uuid::now_v7(),
            role: Role::Assistant,
            content: answer.answer,
            cypher: answer.cypher.filter(|c| !c.trim().is_empty()),
            evidence: Some(answer.evidence),
        }
    }

    pub fn evidence_view(&self) -> EvidenceView {
        match &self.evidence {
            Some(rows) => EvidenceView::for_rows(rows),
            None => EvidenceView::default(),
        }
    }
}

/// Which renderings a turn's evidence gets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EvidenceView {
    pub table: bool,
    pub graph: bool,
}

impl EvidenceView {
    /// A table for any rows; a graph only from two rows up, since one row shows no
    /// relationship between results.
    pub fn for_rows(rows: &ResultSet) -> Self {
        Self { table: !rows.is_empty(), graph: rows.len() >= 2 }
    }
}

/// Handles held for the lifetime of a connected session.
pub struct SessionHandles {
    pub store: Arc<dyn GraphStore>,
    pub translator: Box<dyn TranslatorExecutor>,
}

/// Builds session handles. The endpoint check runs first and must not touch the network.
pub trait Connector {
    fn llm_endpoint(&self) -> Result<LlmEndpoint, AppError>;
    fn open(&self, store: &StoreCredentials, llm: &LlmEndpoint) -> anyhow::Result<SessionHandles>;
}

pub enum ConnectionState {
    Disconnected,
    Connected(SessionHandles),
}

/// Everything one running session knows. Lives in memory only.
pub struct SessionState {
    connection: ConnectionState,
    turns: Vec<ConversationTurn>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self { connection: ConnectionState::Disconnected, turns: Vec::new() }
    }
}

/// Drives connect and question turns over a `SessionState`.
///
/// `Disconnected` moves to `Connected` once, on the first successful connect; a
/// failed connect or a failed turn never changes the connection state.
#[derive(Default)]
pub struct ConversationController {
    state: SessionState,
}

impl ConversationController {
    pub fn new() -> Self { Self::default() }

    pub fn is_connected(&self) -> bool {
        matches!(self.state.connection, ConnectionState::Connected(_))
    }

    pub fn turns(&self) -> &[ConversationTurn] { &self.state.turns }

    pub fn store(&self) -> Option<&dyn GraphStore> {
        match &self.state.connection {
            ConnectionState::Connected(h) => Some(h.store.as_ref()),
            ConnectionState::Disconnected => None,
        }
    }

    pub fn connect(&mut self, creds: &StoreCredentials, connector: &dyn Connector) -> Result<(), AppError> {
        if self.is_connected() {
            log::info!("already connected; keeping the existing session");
            return Ok(());
        }
        let endpoint = connector.llm_endpoint()?;
        match connector.open(creds, &endpoint) {
            Ok(handles) => {
                log::info!("session connected to {} using model {}", creds.uri, endpoint.deployment);
                self.state.connection = ConnectionState::Connected(handles);
                Ok(())
            }
            Err(e) => {
                log::error!("connection failed: {:#}", e);
                Err(AppError::connection(&e))
            }
        }
    }

    /// Run one question turn. The user turn is recorded before the collaborator is
    /// called; the assistant turn only when it succeeds.
    pub fn ask(&mut self, question: &str) -> Result<&ConversationTurn, AppError> {
        let question = question.trim();
        let ConnectionState::Connected(handles) = &self.state.connection else {
            return Err(AppError::NotConnected);
        };
        if question.is_empty() {
            return Err(AppError::TurnExecution {
                message: "Question is empty".to_string(),
                detail: String::new(),
            });
        }
        self.state.turns.push(ConversationTurn::user(question));

        match handles.translator.invoke(question) {
            Ok(answer) => {
                self.state.turns.push(ConversationTurn::assistant(answer));
                Ok(&self.state.turns[self.state.turns.len() - 1])
            }
            Err(e) => {
                log::warn!("question failed: {:#}", e);
                Err(AppError::turn(&e))
            }
        }
    }

    pub fn schema(&self) -> Result<SchemaSnapshot, AppError> {
        let store = self.store().ok_or(AppError::NotConnected)?;
        Ok(SchemaIntrospector::new(store).snapshot())
    }
}
