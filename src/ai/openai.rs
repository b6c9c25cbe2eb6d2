use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::llm::{
    error_body, ChatBackend, ChatMessage, Completion, ProviderEndpoint, WireFormat, MAX_TOKENS,
    TEMPERATURE,
};
use crate::error::ServiceError;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Any endpoint that speaks the `/chat/completions` protocol (OpenRouter,
/// OpenAI, Groq, vLLM...).
pub struct OpenAiBackend {
    client: Client,
}

impl OpenAiBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn wire_format(&self) -> WireFormat {
        WireFormat::OpenAi
    }

    /// The full message list is sent as-is with the endpoint's own key.
    async fn complete(
        &self,
        endpoint: &ProviderEndpoint,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion, ServiceError> {
        let body = CompletionRequest {
            model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let mut req = self
            .client
            .post(endpoint.url("chat/completions"))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = endpoint.api_key.as_deref() {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = error_body(resp).await;
            tracing::warn!("{} returned {}", endpoint.provider, status);
            return Err(ServiceError::Upstream {
                provider: endpoint.provider.clone(),
                body,
            });
        }

        let raw: serde_json::Value = resp.json().await?;
        let parsed: CompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|_| ServiceError::InvalidUpstreamFormat(endpoint.provider.clone()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InvalidUpstreamFormat(endpoint.provider.clone()))?
            .message
            .content
            .unwrap_or_default();

        Ok(Completion {
            content,
            model: model.to_string(),
            raw,
        })
    }
}
