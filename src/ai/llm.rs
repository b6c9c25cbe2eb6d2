use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single (role, content) pair of a provider-agnostic chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// The upstream protocol a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// `/chat/completions` with a message list.
    #[serde(rename = "openai")]
    OpenAi,
    /// Hosted inference endpoint taking one flattened prompt.
    HuggingFace,
    /// Local `/generate` endpoint taking one flattened prompt.
    Ollama,
}

impl WireFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::HuggingFace => "huggingface",
            Self::Ollama => "ollama",
        }
    }
}

/// Where and as whom a single call is made. Passed to every dispatch so that
/// no credential is ever shared between concurrent calls.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderEndpoint {
    /// `base_url` joined with `path`, without doubling the slash.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    /// Canonical model id the request was sent to.
    pub model: String,
    pub raw: serde_json::Value,
}

/// One upstream wire format.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn wire_format(&self) -> WireFormat;

    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, ServiceError>;
}

pub const TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS: u32 = 1024;

/// Shared client for all upstream calls. Requests that outlive `timeout`
/// fail as generation errors.
pub fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
    Ok(client)
}

/// Read an error body for reporting; a body that cannot be read is reported empty.
pub(crate) async fn error_body(resp: reqwest::Response) -> String {
    resp.text().await.unwrap_or_default()
}
