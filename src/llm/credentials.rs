use std::process::Command;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::AppError;

pub const ENV_API_BASE: &str = "AZURE_OPENAI_API_BASE";
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_API_DEPLOY";
pub const ENV_API_KEY: &str = "AZURE_OPENAI_API_KEY";

pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

// Refresh cached tokens this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Model endpoint taken from the environment: the API base URL and the deployment
/// (model) name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LlmEndpoint {
    pub base_url: String,
    pub deployment: String,
}

impl LlmEndpoint {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Both values must be present and non-empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        match (read(ENV_API_BASE), read(ENV_DEPLOYMENT)) {
            (Some(base_url), Some(deployment)) => Ok(Self { base_url, deployment }),
            _ => Err(AppError::Configuration(format!(
                "Missing environment variables: {} and/or {}",
                ENV_API_BASE, ENV_DEPLOYMENT
            ))),
        }
    }
}

/// Source of bearer tokens for the model API.
pub trait CredentialProvider {
    fn bearer_token(&self) -> Result<String>;
}

/// A fixed API key.
pub struct StaticKey(String);

impl StaticKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }
}

impl CredentialProvider for StaticKey {
    fn bearer_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

struct CachedToken {
    token: String,
    expires_on: i64,
}

/// Access tokens from the signed-in Azure CLI, cached until shortly before expiry.
pub struct AzureCliCredential {
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct CliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(default)]
    expires_on: Option<i64>,
}

impl AzureCliCredential {
    pub fn new(scope: impl Into<String>) -> Self {
        Self { scope: scope.into(), cached: Mutex::new(None) }
    }

    fn fetch(&self) -> Result<CachedToken> {
        let output = Command::new("az")
            .args(["account", "get-access-token", "--scope", &self.scope, "--output", "json"])
            .output()
            .context("failed to run the Azure CLI (is `az` installed and on PATH?)")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("az account get-access-token failed: {}", stderr.trim()));
        }
        let parsed = parse_cli_token(&String::from_utf8_lossy(&output.stdout))?;
        log::debug!("acquired Azure CLI token for {}", self.scope);
        Ok(parsed)
    }
}

fn parse_cli_token(json: &str) -> Result<CachedToken> {
    let tok: CliToken = serde_json::from_str(json).context("unexpected Azure CLI token output")?;
    // Older CLI versions omit `expires_on`; treat those tokens as short lived.
    let expires_on = tok
        .expires_on
        .unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp() + EXPIRY_MARGIN_SECS * 2);
    Ok(CachedToken { token: tok.access_token, expires_on })
}

impl CredentialProvider for AzureCliCredential {
    fn bearer_token(&self) -> Result<String> {
        let mut guard = self.cached.lock().map_err(|_| anyhow!("token cache poisoned"))?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Some(c) = guard.as_ref()
            && c.expires_on - EXPIRY_MARGIN_SECS > now
        {
            return Ok(c.token.clone());
        }
        let fresh = self.fetch()?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }
}

/// A static key when `AZURE_OPENAI_API_KEY` is set, otherwise the Azure CLI login.
pub fn default_provider(lookup: impl Fn(&str) -> Option<String>) -> Box<dyn CredentialProvider> {
    match lookup(ENV_API_KEY).filter(|k| !k.trim().is_empty()) {
        Some(key) => Box::new(StaticKey::new(key.trim())),
        None => Box::new(AzureCliCredential::new(COGNITIVE_SERVICES_SCOPE)),
    }
}

/// Access token and its unix expiry from `az account get-access-token` JSON output.
pub fn read_cli_token(json: &str) -> Result<(String, i64)> {
    parse_cli_token(json).map(|c| (c.token, c.expires_on))
}
