use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::error::AppError;
use crate::gql::store::{GraphStore, Neo4jHttpStore, StoreCredentials};
use crate::llm::chat_client::OpenAiChatClient;
use crate::llm::credentials::{default_provider, LlmEndpoint};
use crate::llm::qa_chain::CypherQaChain;
use crate::persistence::settings::AppSettings;
use super::controller::{Connector, SessionHandles};

/// Neo4j over HTTP plus an Azure-hosted OpenAI-compatible model.
pub struct AzureNeo4jConnector {
    timeout: Duration,
    top_k: usize,
    query_log_dir: Option<PathBuf>,
}

impl AzureNeo4jConnector {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            timeout: settings.request_timeout(),
            top_k: settings.top_k,
            query_log_dir: settings.query_log_dir(),
        }
    }
}

impl Connector for AzureNeo4jConnector {
    fn llm_endpoint(&self) -> Result<LlmEndpoint, AppError> {
        LlmEndpoint::from_env()
    }

    fn open(&self, creds: &StoreCredentials, llm: &LlmEndpoint) -> anyhow::Result<SessionHandles> {
        let mut store = Neo4jHttpStore::connect(creds, self.timeout)?;
        if let Some(dir) = &self.query_log_dir {
            store = store.with_audit_log(dir.clone());
        }
        let store: Arc<dyn GraphStore> = Arc::new(store);

        let client = OpenAiChatClient::new(llm, default_provider(|k| std::env::var(k).ok()), self.timeout);
        client.check_credentials().context("model credentials unavailable")?;
        log::info!("model endpoint {} (deployment {})", llm.base_url, client.model());

        let chain = CypherQaChain::new(store.clone(), Box::new(client), self.top_k)?;
        Ok(SessionHandles { store, translator: Box::new(chain) })
    }
}
