use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use crate::gql::schema::SchemaIntrospector;
use crate::gql::store::GraphStore;
use crate::graph_utils::result_set::ResultSet;
use super::chat_client::ChatModel;
use super::prompts::{extract_cypher, render, CYPHER_GENERATION_TEMPLATE, QA_TEMPLATE};

/// Rows handed to the answer prompt and kept as evidence.
pub const DEFAULT_TOP_K: usize = 50;

/// What one question produces.
#[derive(Clone, Debug, Default)]
pub struct TurnAnswer {
    pub answer: String,
    pub cypher: Option<String>,
    pub evidence: ResultSet,
}

/// Translates a question to a query, runs it and summarises the rows, as one call.
pub trait TranslatorExecutor {
    fn invoke(&self, question: &str) -> Result<TurnAnswer>;
}

/// Question → Cypher → rows → answer, with the graph schema baked into the
/// generation prompt.
pub struct CypherQaChain {
    store: Arc<dyn GraphStore>,
    model: Box<dyn ChatModel>,
    schema: String,
    top_k: usize,
}

impl CypherQaChain {
    /// Read the schema from the store once; it is reused for every question.
    pub fn new(store: Arc<dyn GraphStore>, model: Box<dyn ChatModel>, top_k: usize) -> Result<Self> {
        let schema = SchemaIntrospector::new(store.as_ref())
            .schema_text()
            .context("failed to read the graph schema")?;
        log::debug!("graph schema for query generation:\n{}", schema);
        Ok(Self::with_schema(store, model, schema, top_k))
    }

    pub fn with_schema(store: Arc<dyn GraphStore>, model: Box<dyn ChatModel>, schema: String, top_k: usize) -> Self {
        Self { store, model, schema, top_k: top_k.max(1) }
    }

    pub fn schema(&self) -> &str { &self.schema }

    fn generate_cypher(&self, question: &str) -> Result<String> {
        let prompt = render(CYPHER_GENERATION_TEMPLATE, &[("schema", &self.schema), ("question", question)]);
        let reply = self.model.complete(&prompt).context("Cypher generation failed")?;
        let cypher = extract_cypher(&reply);
        if cypher.is_empty() {
            return Err(anyhow!("the model returned no Cypher statement"));
        }
        Ok(cypher)
    }
}

impl TranslatorExecutor for CypherQaChain {
    fn invoke(&self, question: &str) -> Result<TurnAnswer> {
        let cypher = self.generate_cypher(question)?;
        log::info!("generated cypher: {}", cypher);

        let rows = self
            .store
            .query(&cypher)
            .with_context(|| format!("executing generated Cypher failed:\n{}", cypher))?;
        let evidence = rows.truncated(self.top_k);
        log::info!("query returned {} row(s), {} kept as context", rows.len(), evidence.len());

        let context = serde_json::to_string(&evidence.to_json_records())?;
        let prompt = render(QA_TEMPLATE, &[("context", &context), ("question", question)]);
        let answer = self.model.complete(&prompt).context("answer summarisation failed")?;

        Ok(TurnAnswer { answer: answer.trim().to_string(), cypher: Some(cypher), evidence })
    }
}
