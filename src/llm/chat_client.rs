//! OpenAI-compatible chat completions over blocking HTTP.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value as JsonValue;

use super::credentials::{CredentialProvider, LlmEndpoint};

/// A language model that answers a single prompt.
pub trait ChatModel {
    fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct OpenAiChatClient {
    base_url: String,
    model: String,
    credentials: Box<dyn CredentialProvider>,
    agent: ureq::Agent,
    temperature: f32,
}

impl OpenAiChatClient {
    pub fn new(endpoint: &LlmEndpoint, credentials: Box<dyn CredentialProvider>, timeout: Duration) -> Self {
        Self {
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.deployment.clone(),
            credentials,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            temperature: 0.0,
        }
    }

    pub fn model(&self) -> &str { &self.model }

    /// Fail early when no token can be obtained.
    pub fn check_credentials(&self) -> Result<()> {
        self.credentials.bearer_token().map(|_| ())
    }

    fn build_request(&self, prompt: &str) -> JsonValue {
        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "stream": false
        })
    }
}

impl ChatModel for OpenAiChatClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let token = self.credentials.bearer_token().context("could not obtain model API token")?;
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", token))
            .send_json(self.build_request(prompt));
        let body = match resp {
            Ok(r) => r.into_string()?,
            Err(ureq::Error::Status(code, r)) => {
                let detail = r.into_string().unwrap_or_default();
                return Err(anyhow!("model API returned HTTP {}: {}", code, detail.trim()));
            }
            Err(e) => return Err(anyhow!("request to {} failed: {}", url, e)),
        };
        parse_chat_completion(&body)
    }
}

/// `choices[0].message.content` of a chat completion response.
pub fn parse_chat_completion(response: &str) -> Result<String> {
    let json: JsonValue = serde_json::from_str(response).context("model response is not JSON")?;
    json["choices"]
        .get(0)
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("missing choices[0].message.content in model response"))
}
